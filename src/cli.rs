//! Shared CLI helpers and small reusable Clap fragments

use anyhow::{bail, Result};
use clap::Args;
use log::warn;
use std::path::PathBuf;

use crate::checksum::ChecksumType;
use crate::config::Config;
use crate::content_type::Category;
use crate::history::TransferLog;
use crate::logger::{Loggers, TextLogger};
use crate::outcome::TransferOutcome;

/// Options every binary accepts
#[derive(Clone, Debug, Args)]
pub struct CommonOpts {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Append plain-text transfer lines to this file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    /// JSONL transfer history file
    #[arg(long, global = true)]
    pub history_file: Option<PathBuf>,

    /// Do not record transfer history
    #[arg(long, global = true)]
    pub no_history: bool,

    /// Maximum file size in bytes
    #[arg(long, global = true)]
    pub max_size: Option<u64>,

    /// Allowed content categories (repeatable); replaces the configured list
    #[arg(long = "allow", value_enum, global = true)]
    pub allow: Vec<Category>,
}

impl CommonOpts {
    /// Configuration file (or defaults) with command-line overrides applied
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        if let Some(max) = self.max_size {
            config.max_file_size = max;
        }
        if !self.allow.is_empty() {
            config.allowed_categories = self.allow.clone();
        }
        if self.no_history {
            config.history_file = None;
        } else if let Some(path) = &self.history_file {
            config.history_file = Some(path.clone());
        }
        Ok(config)
    }

    /// History plus optional text log. A log file that cannot be opened is
    /// skipped with a warning; the transfer still runs.
    pub fn loggers(&self, config: &Config) -> Loggers {
        let mut loggers = Loggers::new();
        if let Some(path) = &config.history_file {
            loggers.push(Box::new(TransferLog::new(path)));
        }
        if let Some(path) = &self.log_file {
            match TextLogger::new(path) {
                Ok(text) => loggers.push(Box::new(text)),
                Err(e) => warn!("text log disabled, cannot open {}: {:#}", path.display(), e),
            }
        }
        loggers
    }
}

/// Receiver options used by `dropline receive` and `droplined`
#[derive(Clone, Debug, Args)]
pub struct ReceiveOpts {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface to bind
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory received files are stored in
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Give up waiting for a sender after this many milliseconds (0 = wait forever)
    #[arg(long)]
    pub accept_timeout_ms: Option<u64>,
}

impl ReceiveOpts {
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind_host = bind.clone();
        }
        if let Some(dir) = &self.storage_dir {
            config.storage_dir = dir.clone();
        }
        if let Some(ms) = self.accept_timeout_ms {
            config.accept_timeout_ms = ms;
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct SendOpts {
    /// File to send
    pub file: PathBuf,

    /// Receiver: host, host:port or dropline://host:port
    pub destination: String,

    /// Digest declared to the receiver
    #[arg(long, value_enum)]
    pub algorithm: Option<ChecksumType>,

    /// Transfer block size in bytes
    #[arg(long)]
    pub block_size: Option<usize>,
}

impl SendOpts {
    pub fn apply(&self, config: &mut Config) {
        if let Some(algo) = self.algorithm {
            config.algorithm = algo;
        }
        if let Some(bs) = self.block_size {
            config.block_size = bs;
        }
    }
}

/// Daemon options for droplined
#[derive(Clone, Debug, clap::Parser)]
#[command(name = "droplined", version, about = "Receive files one sender at a time until interrupted")]
pub struct DaemonOpts {
    #[command(flatten)]
    pub common: CommonOpts,

    #[command(flatten)]
    pub receive: ReceiveOpts,
}

pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
    log::debug!("Verbose logging enabled");
}

/// Print a successful outcome; turn a failed one into the process error
pub fn report(outcome: &TransferOutcome) -> Result<()> {
    if outcome.is_success() {
        println!("{}", outcome);
        Ok(())
    } else {
        bail!("{}", outcome)
    }
}
