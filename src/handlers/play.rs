use anyhow::{Context, Result};
use console::{Term, style};
use sharefetch::{
    CancelReason, Config, PresentationState, ShareLink, TransferController, TransferEvent,
    TransferKind, TransferOutcome,
};
use std::path::Path;
use std::process;
use tokio::process::{Child, Command};
use tracing::warn;

use super::{lookup_spinner, print_alert, transfer_bar};

pub async fn handle_play(config: Config, raw: &str, player: Option<String>) -> Result<()> {
    let player = player.or_else(|| config.preview.player.clone());

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
        "{} Buffering {} ({})",
        style("▶️").cyan(),
        style(&metadata.title).cyan().bold(),
        state.size_label().unwrap_or_default()
    ))?;

    let link = ShareLink::parse(&state.input)?;
    let job = match controller.play(&link).await {
        Ok(job) => job,
        Err(e) => {
            print_alert(&term, &format!("Failed to load video: {}", e), true)?;
            process::exit(1);
        }
    };

    let pb = transfer_bar(metadata.size);
    let mut player_process: Option<Child> = None;

    let outcome = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break TransferOutcome::Failed("Transfer events closed".to_string());
                };

                let alert = state.apply(&event);
                match &event {
                    TransferEvent::Progress { progress, .. } => {
                        if let Some(total) = progress.total_bytes {
                            pb.set_length(total.max(progress.bytes_written));
                        }
                        pb.set_position(progress.bytes_written);
                        pb.set_message(format!("{:.0}% buffered", state.buffered * 100.0));
                    }
                    TransferEvent::Playable { path, .. } => {
                        if let Some(command) = &player {
                            match launch_player(command, path) {
                                Ok(child) => {
                                    pb.println(format!(
                                        "{} Enough buffered, started {}",
                                        style("🎬").green(),
                                        style(command).cyan()
                                    ));
                                    player_process = Some(child);
                                }
                                Err(e) => warn!("{:#}", e),
                            }
                        }
                        if player_process.is_none() {
                            pb.println(format!(
                                "{} Playable file: {}",
                                style("🎬").green(),
                                style(path.display()).cyan()
                            ));
                        }
                    }
                    _ => {}
                }

                if let TransferEvent::Finished { job: finished, outcome, .. } = &event {
                    if *finished == job {
                        pb.finish_and_clear();
                        if let Some(alert) = alert {
                            print_alert(&term, &alert, true)?;
                        }
                        break outcome.clone();
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller
                    .cancel(TransferKind::Preview, CancelReason::UserRequested)
                    .await;
            }
        }
    };

    if let TransferOutcome::Completed(path) = &outcome {
        term.write_line(&format!(
            "{} Fully buffered: {}",
            style("✅").green(),
            style(path.display()).cyan()
        ))?;

        match player_process.as_mut() {
            Some(child) => {
                term.write_line("Waiting for the player to exit...")?;
                tokio::select! {
                    status = child.wait() => {
                        if let Err(e) = status {
                            warn!("Player exited abnormally: {}", e);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            None => {
                term.write_line("Press Ctrl-C to stop and remove the buffered file")?;
                tokio::signal::ctrl_c().await?;
            }
        }
    }

    if let Some(mut child) = player_process {
        let _ = child.start_kill();
    }
    controller.shutdown().await;

    if matches!(outcome, TransferOutcome::Failed(_)) {
        process::exit(1);
    }

    Ok(())
}

/// Start the player on the partially written file. The command may carry
/// extra arguments, e.g. "mpv --fs".
fn launch_player(command: &str, path: &Path) -> Result<Child> {
    let mut parts = command.split_whitespace();
    let program = parts.next().context("Player command cannot be empty")?;

    Command::new(program)
        .args(parts)
        .arg(path)
        .spawn()
        .with_context(|| format!("Failed to start player: {}", command))
}
