//! dropline - send one file straight to a listening peer
//!
//! The transfer core lives in the library; this binary supplies file paths,
//! addresses and ports, shows progress, and keeps the transfer history.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::net::{IpAddr, UdpSocket};

use dropline::cli::{init_logging, report, CommonOpts, ReceiveOpts, SendOpts};
use dropline::history::TransferLog;
use dropline::logger::Logger;
use dropline::net_async::{client, server};
use dropline::url::parse_destination;
use dropline::{progress, Operation, TransferError, TransferOutcome, TransferStatus};

#[derive(Parser)]
#[command(name = "dropline", version, about = "Point-to-point file transfer")]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file to a listening receiver
    Send(SendOpts),
    /// Wait for one sender and store its file
    Receive(ReceiveOpts),
    /// Show recorded transfers
    History {
        /// Only the most recent N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show this device's addresses for the sender to use
    Ip,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.common.verbose);
    let mut config = cli.common.load_config()?;

    match cli.command {
        Commands::Send(opts) => {
            opts.apply(&mut config);
            config.validate()?;
            let dest = parse_destination(&opts.destination, config.port)
                .ok_or_else(|| anyhow!("invalid destination: {}", opts.destination))?;
            let loggers = cli.common.loggers(&config);
            loggers.start(Operation::Send, &dest.to_string());

            let bar = progress::spinner(format!("Sending to {}", dest));
            let outcome = tokio::select! {
                outcome = client::send(&opts.file, &dest.host, dest.port, &config, Some(&bar)) => outcome,
                _ = tokio::signal::ctrl_c() => {
                    let name = opts.file.file_name().map(|n| n.to_string_lossy().into_owned());
                    TransferOutcome::failed(Operation::Send, name.as_deref(), &TransferError::Cancelled, None)
                }
            };
            progress::finish(&bar, outcome.is_success());
            loggers.record_outcome(&outcome);
            report(&outcome)
        }
        Commands::Receive(opts) => {
            opts.apply(&mut config);
            config.validate()?;
            let loggers = cli.common.loggers(&config);
            loggers.start(Operation::Receive, &config.bind_addr());

            let bar = progress::spinner(format!("Waiting for a file on port {}", config.port));
            let outcome = tokio::select! {
                outcome = server::listen_and_receive(config.port, &config, Some(&bar)) => outcome,
                _ = tokio::signal::ctrl_c() => {
                    TransferOutcome::failed(Operation::Receive, None, &TransferError::Cancelled, None)
                }
            };
            progress::finish(&bar, outcome.is_success());
            loggers.record_outcome(&outcome);
            report(&outcome)
        }
        Commands::History { limit } => {
            let path = config
                .history_file
                .clone()
                .ok_or_else(|| anyhow!("transfer history is disabled"))?;
            let entries = TransferLog::new(&path).load()?;
            let skip = limit.map(|n| entries.len().saturating_sub(n)).unwrap_or(0);
            for entry in entries.iter().skip(skip) {
                let bytes = entry
                    .byte_count
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "-".into());
                let status = match &entry.status {
                    TransferStatus::Success => "ok".to_string(),
                    TransferStatus::Failed { cause, .. } => format!("failed: {}", cause),
                };
                println!(
                    "{}  {:<7} {:<30} {:>12}  {}",
                    entry.timestamp, entry.operation, entry.file_name, bytes, status
                );
            }
            if entries.is_empty() {
                println!("No transfers recorded in {}", path.display());
            }
            Ok(())
        }
        Commands::Ip => show_addresses().await,
    }
}

async fn show_addresses() -> Result<()> {
    let host = hostname::get()
        .context("read hostname")?
        .to_string_lossy()
        .into_owned();
    println!("Hostname: {}", host);

    // Routing lookup only; connecting a UDP socket sends nothing
    if let Some(ip) = outbound_ip() {
        println!("Device IP Address: {}", ip);
    }

    match tokio::net::lookup_host((host.as_str(), 0)).await {
        Ok(addrs) => {
            let mut seen: Vec<IpAddr> = Vec::new();
            for addr in addrs {
                let ip = addr.ip();
                if !ip.is_loopback() && !seen.contains(&ip) {
                    seen.push(ip);
                    println!("  {}", ip);
                }
            }
        }
        Err(e) => log::debug!("resolve {}: {}", host, e),
    }
    Ok(())
}

fn outbound_ip() -> Option<IpAddr> {
    let sock = UdpSocket::bind("0.0.0.0:0").ok()?;
    sock.connect("192.0.2.1:80").ok()?;
    sock.local_addr().ok().map(|a| a.ip())
}
