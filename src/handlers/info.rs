use anyhow::Result;
use console::{Term, style};
use sharefetch::{Config, PresentationState, TransferController};
use std::process;

use super::{lookup_spinner, print_alert};

pub async fn handle_info(config: &Config, raw: &str, json: bool) -> Result<()> {
    let term = Term::stdout();
    let (controller, _events) = TransferController::new(config.clone())?;
    let mut state = PresentationState::new(config.ui.alert_duration());

    let spinner = lookup_spinner();
    let result = controller.get_video(raw, &mut state).await;
    spinner.finish_and_clear();

    let metadata = match result {
        Ok(metadata) => metadata,
        Err(_) => {
            if let Some(alert) = state.alert() {
                print_alert(&term, alert, true)?;
            }
            process::exit(1);
        }
    };

    if json {
        term.write_line(&serde_json::to_string_pretty(&metadata)?)?;
        return Ok(());
    }

    term.write_line(&format!("{} File details:", style("📦").cyan()))?;
    term.write_line(&format!(
        "   {}: {}",
        style("Title").dim(),
        style(&metadata.title).cyan()
    ))?;
    if let Some(size) = state.size_label() {
        term.write_line(&format!("   {}: {}", style("Size").dim(), style(size).green()))?;
    }
    term.write_line(&format!("   {}: {}", style("Link").dim(), state.input))?;

    Ok(())
}
