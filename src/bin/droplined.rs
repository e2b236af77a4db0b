use anyhow::{bail, Result};
use clap::Parser;

use dropline::cli::{init_logging, DaemonOpts};
use dropline::logger::Logger;
use dropline::net_async::server;
use dropline::{FailureKind, Operation};

/// Sequential one-shot receives; each sender gets a fresh listener
#[tokio::main]
async fn main() -> Result<()> {
    let opts = DaemonOpts::parse();
    init_logging(opts.common.verbose);

    let mut config = opts.common.load_config()?;
    opts.receive.apply(&mut config);
    config.validate()?;
    let loggers = opts.common.loggers(&config);

    println!("Starting dropline receiver:");
    println!("  Storage: {}", config.storage_dir.display());
    println!("  Bind: {}", config.bind_addr());
    println!("  Max size: {} bytes", config.max_file_size);

    if config.bind_host == "0.0.0.0" {
        eprintln!("WARNING: Binding to 0.0.0.0 accepts files from any network interface");
        eprintln!("   Transfers are neither encrypted nor authenticated; use on trusted networks only");
    }

    loop {
        loggers.start(Operation::Receive, &config.bind_addr());
        let outcome = tokio::select! {
            outcome = server::listen_and_receive(config.port, &config, None) => outcome,
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted, shutting down");
                return Ok(());
            }
        };
        loggers.record_outcome(&outcome);
        println!("{}", outcome);
        if outcome.failure_kind() == Some(FailureKind::PortUnavailable) {
            bail!("cannot keep listening: {}", outcome.cause().unwrap_or_default());
        }
    }
}
