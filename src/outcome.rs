//! Result of one transfer attempt, handed to whoever started it

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{FailureKind, TransferError};
use crate::protocol::defaults::UNKNOWN_FILE_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Send,
    Receive,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send => f.write_str("send"),
            Self::Receive => f.write_str("receive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransferStatus {
    Success,
    Failed { kind: FailureKind, cause: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub operation: Operation,
    pub file_name: String,
    pub status: TransferStatus,
    pub byte_count: Option<u64>,
    /// Stored file, set on a successful receive
    pub path: Option<PathBuf>,
}

impl TransferOutcome {
    pub fn success(operation: Operation, file_name: impl Into<String>, byte_count: u64) -> Self {
        Self {
            operation,
            file_name: file_name.into(),
            status: TransferStatus::Success,
            byte_count: Some(byte_count),
            path: None,
        }
    }

    pub fn failed(
        operation: Operation,
        file_name: Option<&str>,
        err: &TransferError,
        byte_count: Option<u64>,
    ) -> Self {
        Self {
            operation,
            file_name: file_name.unwrap_or(UNKNOWN_FILE_NAME).to_string(),
            status: TransferStatus::Failed {
                kind: err.kind(),
                cause: err.to_string(),
            },
            byte_count,
            path: None,
        }
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, TransferStatus::Success)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.status {
            TransferStatus::Success => None,
            TransferStatus::Failed { kind, .. } => Some(*kind),
        }
    }

    pub fn cause(&self) -> Option<&str> {
        match &self.status {
            TransferStatus::Success => None,
            TransferStatus::Failed { cause, .. } => Some(cause),
        }
    }
}

impl std::fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.status {
            TransferStatus::Success => {
                write!(f, "{} {}: ok", self.operation, self.file_name)?;
                if let Some(bytes) = self.byte_count {
                    write!(f, " ({} bytes)", bytes)?;
                }
                if let Some(path) = &self.path {
                    write!(f, " -> {}", path.display())?;
                }
                Ok(())
            }
            TransferStatus::Failed { cause, .. } => {
                write!(f, "{} {}: failed: {}", self.operation, self.file_name, cause)
            }
        }
    }
}
