use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::progress::playable_threshold;
use super::{
    CancelReason, JobId, ProgressSampler, TransferError, TransferEvent, TransferKind,
    TransferOptions, TransferOutcome, TransferRequest, TransferState, Transport,
};

/// Cancellation flag shared between the controller and one session.
///
/// The token is set synchronously by [`CancelSignal::cancel`]; the first
/// reason given wins.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelSignal {
    pub(crate) fn cancel(&self, reason: CancelReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub(crate) fn reason(&self) -> Option<CancelReason> {
        if !self.token.is_cancelled() {
            return None;
        }
        Some(
            self.reason
                .get()
                .copied()
                .unwrap_or(CancelReason::UserRequested),
        )
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Per-kind state, written by the controller and by sessions. A session
/// only updates the slot while it still owns it.
#[derive(Debug, Clone, Default)]
pub(crate) struct StateBoard {
    slots: Arc<Mutex<HashMap<TransferKind, (Option<JobId>, TransferState)>>>,
}

impl StateBoard {
    pub(crate) fn claim(&self, kind: TransferKind, job: JobId, state: TransferState) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.insert(kind, (Some(job), state));
    }

    pub(crate) fn update(&self, kind: TransferKind, job: JobId, state: TransferState) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((Some(owner), current)) = slots.get_mut(&kind) {
            if *owner == job {
                *current = state;
            }
        }
    }

    pub(crate) fn state(&self, kind: TransferKind) -> TransferState {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&kind)
            .map_or(TransferState::Idle, |(_, state)| *state)
    }

    pub(crate) fn running_job(&self, kind: TransferKind) -> Option<JobId> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.get(&kind) {
            Some((job, state)) if state.is_running() => *job,
            _ => None,
        }
    }
}

/// One job of one kind: runs attempts until success, cancellation, or an
/// exhausted retry budget.
pub(crate) struct TransferSession {
    pub(crate) id: JobId,
    pub(crate) kind: TransferKind,
    pub(crate) request: TransferRequest,
    pub(crate) options: TransferOptions,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) signal: CancelSignal,
    pub(crate) events: mpsc::UnboundedSender<TransferEvent>,
    pub(crate) board: StateBoard,
}

impl TransferSession {
    pub(crate) async fn run(self) -> TransferOutcome {
        let mut retries_remaining = self.options.retries_for(self.kind);
        let mut sampler = ProgressSampler::new(
            self.options.speed_sample_interval,
            self.options.expected_size,
            Instant::now(),
        );
        let mut playable_sent = false;
        let mut attempt = 0;

        let outcome = loop {
            attempt += 1;
            if let Some(reason) = self.signal.reason() {
                break TransferOutcome::Cancelled(reason);
            }

            self.board
                .update(self.kind, self.id, TransferState::Active);
            self.emit(TransferEvent::Started {
                job: self.id,
                kind: self.kind,
                source_url: self.request.source_url.clone(),
                destination: self.request.destination.clone(),
                attempt,
            });
            sampler.restart(Instant::now());

            let result = self.attempt(&mut sampler, &mut playable_sent).await;

            // A cancelled job never reports success or failure.
            if let Some(reason) = self.signal.reason() {
                break TransferOutcome::Cancelled(reason);
            }

            match result {
                Ok(bytes) => {
                    info!(
                        "{} {} completed: {} bytes to {:?}",
                        self.kind, self.id, bytes, self.request.destination
                    );
                    if self.kind == TransferKind::Preview && !playable_sent {
                        self.emit(TransferEvent::Playable {
                            job: self.id,
                            kind: self.kind,
                            path: self.request.destination.clone(),
                        });
                    }
                    break TransferOutcome::Completed(self.request.destination.clone());
                }
                Err(e) if retries_remaining == 0 => {
                    warn!("{} {} failed: {}", self.kind, self.id, e);
                    break TransferOutcome::Failed(e.to_string());
                }
                Err(e) => {
                    warn!(
                        "Retrying {} {}... ({} retries left): {}",
                        self.kind, self.id, retries_remaining, e
                    );
                    self.emit(TransferEvent::Retrying {
                        job: self.id,
                        kind: self.kind,
                        attempt,
                        retries_remaining,
                        delay: self.options.retry_delay,
                        error: e.to_string(),
                    });

                    tokio::select! {
                        _ = self.signal.token().cancelled() => {}
                        _ = sleep(self.options.retry_delay) => {}
                    }
                    retries_remaining -= 1;
                }
            }
        };

        if self.kind == TransferKind::Preview && !matches!(outcome, TransferOutcome::Completed(_))
        {
            discard_file(&self.request.destination).await;
        }

        self.board.update(self.kind, self.id, outcome.state());
        self.emit(TransferEvent::Finished {
            job: self.id,
            kind: self.kind,
            outcome: outcome.clone(),
        });

        outcome
    }

    async fn attempt(
        &self,
        sampler: &mut ProgressSampler,
        playable_sent: &mut bool,
    ) -> Result<u64, TransferError> {
        let threshold_fraction = self.options.playable_fraction;
        let threshold_min = self.options.playable_min_bytes;

        let mut on_progress = |bytes_written: u64, content_length: Option<u64>| {
            if self.signal.token().is_cancelled() {
                return;
            }

            let progress = sampler.observe(bytes_written, content_length, Instant::now());
            self.emit(TransferEvent::Progress {
                job: self.id,
                kind: self.kind,
                progress,
            });

            if self.kind == TransferKind::Preview
                && !*playable_sent
                && bytes_written
                    > playable_threshold(progress.total_bytes, threshold_fraction, threshold_min)
            {
                *playable_sent = true;
                self.emit(TransferEvent::Playable {
                    job: self.id,
                    kind: self.kind,
                    path: self.request.destination.clone(),
                });
            }
        };

        self.transport
            .transfer(&self.request, &mut on_progress, self.signal.token())
            .await
    }

    fn emit(&self, event: TransferEvent) {
        let _ = self.events.send(event);
    }
}

/// Remove a temporary file, logging anything but "not found".
pub(crate) async fn discard_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Deleted temporary file {:?}", path),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete temporary file {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cancel_reason_wins() {
        let signal = CancelSignal::default();
        assert_eq!(signal.reason(), None);

        signal.cancel(CancelReason::Superseded);
        signal.cancel(CancelReason::UserRequested);
        assert_eq!(signal.reason(), Some(CancelReason::Superseded));
        assert!(signal.token().is_cancelled());
    }

    #[test]
    fn test_stale_session_cannot_overwrite_state() {
        let board = StateBoard::default();
        let old = JobId::new();
        let new = JobId::new();

        board.claim(TransferKind::Preview, old, TransferState::Active);
        board.claim(TransferKind::Preview, new, TransferState::Resolving);
        board.update(TransferKind::Preview, old, TransferState::Cancelled);

        assert_eq!(board.state(TransferKind::Preview), TransferState::Resolving);
        assert_eq!(board.running_job(TransferKind::Preview), Some(new));
        assert_eq!(board.state(TransferKind::Persistent), TransferState::Idle);
    }

    #[tokio::test]
    async fn test_discard_missing_file_is_silent() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.mp4");
        discard_file(&path).await;

        std::fs::write(&path, b"partial").unwrap();
        discard_file(&path).await;
        assert!(!path.exists());
    }
}
