use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::outcome::{Operation, TransferOutcome, TransferStatus};

/// Transfer record sink. Recording is fire-and-forget: implementations
/// swallow their own failures so a broken sink never fails a transfer.
pub trait Logger: Send + Sync {
    fn start(&self, _operation: Operation, _target: &str) {}
    fn record(
        &self,
        _operation: Operation,
        _file_name: &str,
        _status: &TransferStatus,
        _byte_count: Option<u64>,
    ) {
    }

    fn record_outcome(&self, outcome: &TransferOutcome) {
        self.record(
            outcome.operation,
            &outcome.file_name,
            &outcome.status,
            outcome.byte_count,
        );
    }
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Forwards every call to each inner logger in order
#[derive(Default)]
pub struct Loggers {
    inner: Vec<Box<dyn Logger>>,
}

impl Loggers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, logger: Box<dyn Logger>) {
        self.inner.push(logger);
    }
}

impl Logger for Loggers {
    fn start(&self, operation: Operation, target: &str) {
        for l in &self.inner {
            l.start(operation, target);
        }
    }
    fn record(
        &self,
        operation: Operation,
        file_name: &str,
        status: &TransferStatus,
        byte_count: Option<u64>,
    ) {
        for l in &self.inner {
            l.record(operation, file_name, status, byte_count);
        }
    }
}

/// Plain timestamped lines appended to a file
pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn start(&self, operation: Operation, target: &str) {
        self.line(&format!("START op={} target={}", operation, target));
    }
    fn record(
        &self,
        operation: Operation,
        file_name: &str,
        status: &TransferStatus,
        byte_count: Option<u64>,
    ) {
        let bytes = byte_count.map(|b| b.to_string()).unwrap_or_else(|| "-".into());
        match status {
            TransferStatus::Success => {
                self.line(&format!("DONE op={} file={} bytes={}", operation, file_name, bytes))
            }
            TransferStatus::Failed { kind, cause } => self.line(&format!(
                "ERROR op={} file={} bytes={} kind={} msg={}",
                operation, file_name, bytes, kind, cause
            )),
        }
    }
}
