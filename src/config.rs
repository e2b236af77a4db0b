//! Transfer configuration, loadable from TOML

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checksum::ChecksumType;
use crate::content_type::Category;
use crate::protocol::{defaults, timeouts};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Interface the receiver binds
    pub bind_host: String,
    /// Receiver listen port and sender default destination port
    pub port: u16,
    /// Size ceiling in bytes, enforced on both sides
    pub max_file_size: u64,
    pub allowed_categories: Vec<Category>,
    /// Where received files land
    pub storage_dir: PathBuf,
    /// Transfer block size in bytes
    pub block_size: usize,
    /// Digest the sender declares in metadata
    pub algorithm: ChecksumType,
    pub accept_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// JSONL transfer history; `None` disables recording
    pub history_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: defaults::BIND_HOST.to_string(),
            port: defaults::PORT,
            max_file_size: defaults::MAX_FILE_SIZE,
            allowed_categories: Category::ALL.to_vec(),
            storage_dir: PathBuf::from(defaults::STORAGE_DIR),
            block_size: defaults::BLOCK_SIZE,
            algorithm: ChecksumType::default(),
            accept_timeout_ms: timeouts::ACCEPT_MS,
            handshake_timeout_ms: timeouts::HANDSHAKE_MS,
            idle_timeout_ms: timeouts::IDLE_MS,
            connect_timeout_ms: timeouts::CONNECT_MS,
            history_file: Some(PathBuf::from(defaults::HISTORY_FILE)),
        }
    }
}

fn optional_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Config =
            toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, otherwise defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size > defaults::MAX_BLOCK_SIZE {
            bail!(
                "block_size must be between 1 and {} bytes, got {}",
                defaults::MAX_BLOCK_SIZE,
                self.block_size
            );
        }
        if self.allowed_categories.is_empty() {
            bail!("allowed_categories must not be empty");
        }
        if self.bind_host.trim().is_empty() {
            bail!("bind_host must not be empty");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        if self.bind_host.contains(':') && !self.bind_host.starts_with('[') {
            format!("[{}]:{}", self.bind_host, self.port)
        } else {
            format!("{}:{}", self.bind_host, self.port)
        }
    }

    pub fn accept_timeout(&self) -> Option<Duration> {
        optional_ms(self.accept_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        optional_ms(self.handshake_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        optional_ms(self.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        optional_ms(self.connect_timeout_ms)
    }
}
