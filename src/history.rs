//! Transfer history: one JSON line per transfer attempt

use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use crate::logger::Logger;
use crate::outcome::{Operation, TransferStatus};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub id: String,
    pub operation: Operation,
    pub file_name: String,
    pub status: TransferStatus,
    pub byte_count: Option<u64>,
}

impl HistoryEntry {
    pub fn new(
        operation: Operation,
        file_name: &str,
        status: &TransferStatus,
        byte_count: Option<u64>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            file_name: file_name.to_string(),
            status: status.clone(),
            byte_count,
        }
    }
}

/// Append-only history file; appends are serialized through one lock
pub struct TransferLog {
    log_file_path: PathBuf,
    write_lock: Mutex<()>,
}

impl TransferLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        TransferLog {
            log_file_path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn add_entry(&self, entry: &HistoryEntry) -> Result<()> {
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create history directory")?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open transfer history file")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// All entries, oldest first. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open transfer history file for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: HistoryEntry = serde_json::from_str(&line)
                .with_context(|| format!("bad history entry on line {}", idx + 1))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl Logger for TransferLog {
    fn record(
        &self,
        operation: Operation,
        file_name: &str,
        status: &TransferStatus,
        byte_count: Option<u64>,
    ) {
        let entry = HistoryEntry::new(operation, file_name, status, byte_count);
        if let Err(e) = self.add_entry(&entry) {
            warn!(
                "could not record transfer in {}: {:#}",
                self.log_file_path.display(),
                e
            );
        }
    }
}
