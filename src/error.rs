use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Coarse failure class carried in every failed outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing, unreadable, oversized or disallowed local file
    LocalFile,
    Network,
    /// Bind refused: address in use, permission denied
    PortUnavailable,
    /// Malformed or missing metadata, missing acknowledgment
    Protocol,
    /// The receiver declined the handshake
    Rejected,
    /// Checker rejection, digest mismatch, size overflow
    Integrity,
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LocalFile => "local file error",
            Self::Network => "network error",
            Self::PortUnavailable => "port unavailable",
            Self::Protocol => "protocol error",
            Self::Rejected => "rejected",
            Self::Integrity => "integrity error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("local file rejected: {0}")]
    LocalFile(String),

    #[error("network error during {context}: {source}")]
    Network {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("port {port} unavailable: {source}")]
    PortUnavailable {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("receiver rejected transfer")]
    Rejected,

    #[error("size overflow: received {received} bytes, limit is {limit} bytes")]
    Overflow { received: u64, limit: u64 },

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("integrity mismatch: declared digest {expected}, computed {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::LocalFile(_) | Self::Storage(_) => FailureKind::LocalFile,
            Self::Network { .. } => FailureKind::Network,
            Self::PortUnavailable { .. } => FailureKind::PortUnavailable,
            Self::Protocol(_) => FailureKind::Protocol,
            Self::Rejected => FailureKind::Rejected,
            Self::Overflow { .. } | Self::Integrity(_) | Self::DigestMismatch { .. } => {
                FailureKind::Integrity
            }
            Self::Cancelled => FailureKind::Cancelled,
        }
    }

    pub(crate) fn network(context: impl Into<String>, source: io::Error) -> Self {
        Self::Network {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn protocol(err: anyhow::Error) -> Self {
        Self::Protocol(format!("{:#}", err))
    }

    /// Map a bind failure; refusals the operator can fix by picking another
    /// port are kept apart from generic I/O errors
    pub(crate) fn bind(port: u16, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::AddrInUse
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::AddrNotAvailable => Self::PortUnavailable { port, source },
            _ => Self::network("bind", source),
        }
    }
}
