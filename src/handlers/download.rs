use anyhow::Result;
use console::{Term, style};
use dialoguer::Confirm;
use sharefetch::transfer::progress::format_duration;
use sharefetch::{
    CancelReason, Config, PresentationState, ShareLink, TransferController, TransferEvent,
    TransferKind, TransferOutcome,
};
use std::path::PathBuf;
use std::process;

use super::{lookup_spinner, print_alert, transfer_bar};

pub async fn handle_download(
    mut config: Config,
    raw: &str,
    output_dir: Option<PathBuf>,
    retries: Option<u32>,
    skip_confirm: bool,
) -> Result<()> {
    if let Some(dir) = output_dir {
        config.transfer.download_dir = Some(dir);
    }
    if let Some(retries) = retries {
        config.transfer.max_retries = retries;
    }

    let term = Term::stdout();
    let (controller, mut events) = TransferController::new(config.clone())?;
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

    term.write_line(&format!(
        "{} Downloading {} ({})",
        style("⬇️").cyan(),
        style(&metadata.title).cyan().bold(),
        state.size_label().unwrap_or_default()
    ))?;
    term.write_line(&format!(
        "{} Download directory: {}",
        style("📁").cyan(),
        style(config.transfer.resolved_download_dir().display()).cyan()
    ))?;

    let link = ShareLink::parse(&state.input)?;
    let job = match controller.download(&link).await {
        Ok(job) => job,
        Err(e) => {
            print_alert(&term, &format!("Failed to initiate download: {}", e), true)?;
            process::exit(1);
        }
    };

    let pb = transfer_bar(metadata.size);
    let outcome = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break TransferOutcome::Failed("Transfer events closed".to_string());
                };

                let alert = state.apply(&event);
                match &event {
                    TransferEvent::Progress { .. } => {
                        pb.set_length(state.total_bytes.max(state.downloaded_bytes));
                        pb.set_position(state.downloaded_bytes);
                        pb.set_message(state.speed_label());
                    }
                    TransferEvent::Retrying { retries_remaining, delay, error, .. } => {
                        pb.println(format!(
                            "{} {} - retrying in {} ({} retries left)",
                            style("⚠️").yellow(),
                            error,
                            format_duration(*delay),
                            retries_remaining
                        ));
                        pb.reset();
                    }
                    _ => {}
                }

                if let TransferEvent::Finished { job: finished, outcome, .. } = &event {
                    if *finished == job {
                        pb.finish_and_clear();
                        if let Some(alert) = alert {
                            print_alert(&term, &alert, !matches!(outcome, TransferOutcome::Completed(_)))?;
                        }
                        break outcome.clone();
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let confirmed = skip_confirm
                    || pb.suspend(|| {
                        Confirm::new()
                            .with_prompt("Cancel the download?")
                            .default(true)
                            .interact()
                            .unwrap_or(true)
                    });

                if confirmed {
                    state.confirm_cancel();
                    controller
                        .cancel(TransferKind::Persistent, CancelReason::UserRequested)
                        .await;
                } else {
                    state.dismiss_cancel_confirm();
                }
            }
        }
    };

    controller.shutdown().await;

    match outcome {
        TransferOutcome::Completed(path) => {
            term.write_line(&format!(
                "{} Saved to {}",
                style("📁").cyan(),
                style(path.display()).cyan()
            ))?;
        }
        TransferOutcome::Cancelled(_) => {
            term.write_line(&format!("{} Download cancelled", style("🛑").yellow()))?;
        }
        TransferOutcome::Failed(_) => process::exit(1),
    }

    Ok(())
}
