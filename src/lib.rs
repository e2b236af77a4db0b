//! Dropline library
//!
//! Point-to-point single file transfer: metadata handshake, block-streamed
//! bytes, integrity verification on both ends.

pub mod checksum;
pub mod cli;
pub mod config;
pub mod content_type;
pub mod error;
pub mod history;
pub mod integrity;
pub mod logger;
pub mod net_async;
pub mod outcome;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod url;

pub use config::Config;
pub use error::{FailureKind, TransferError};
pub use integrity::{IntegrityChecker, IntegrityResult};
pub use outcome::{Operation, TransferOutcome, TransferStatus};
pub use protocol_core::TransferMetadata;
