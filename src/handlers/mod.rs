pub mod config;
pub mod download;
pub mod info;
pub mod normalize;
pub mod play;

use anyhow::Result;
use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export all handlers
pub use config::handle_config;
pub use download::handle_download;
pub use info::handle_info;
pub use normalize::handle_normalize;
pub use play::handle_play;

/// Spinner shown while the link API is queried
fn lookup_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .unwrap(),
    );
    spinner.set_message("Fetching video information...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Byte progress bar for a transfer whose size may be unknown yet
fn transfer_bar(total_bytes: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_bytes);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:.cyan/blue}] {bytes}/{total_bytes} ({msg}, {eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_alert(term: &Term, message: &str, is_error: bool) -> Result<()> {
    if is_error {
        term.write_line(&format!("{} {}", style("❌").red(), style(message).red()))?;
    } else {
        term.write_line(&format!("{} {}", style("✅").green(), message))?;
    }
    Ok(())
}
