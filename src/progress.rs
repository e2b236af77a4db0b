//! Terminal progress display for a single transfer
//!
//! A spinner while waiting on the peer, then a byte bar once the size is
//! known. Bars draw to stderr and hide themselves when it is not a terminal.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Spinner shown until the handshake completes
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(TICK_CHARS),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Switch a spinner to a byte bar of `total` bytes
pub fn begin_bytes(bar: &ProgressBar, total: u64, name: &str) {
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_length(total);
    bar.set_position(0);
    bar.set_message(name.to_string());
}

pub fn finish(bar: &ProgressBar, ok: bool) {
    if ok {
        bar.finish_with_message("done");
    } else {
        bar.abandon_with_message("failed");
    }
}
