//! UI-facing projection of controller events.
//!
//! `PresentationState` holds nothing the controller does not tell it: every
//! flag is derived from a lookup result or a [`TransferEvent`]. Events for a
//! job other than the one currently tracked for that kind are ignored.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use crate::link::{LinkError, ShareLink};
use crate::resolver::{ResolveError, VideoMetadata};
use crate::transfer::progress::{calculate_eta, format_size, format_speed};
use crate::transfer::{JobId, TransferEvent, TransferKind, TransferOutcome};

#[derive(Debug, Clone)]
pub struct Alert {
    pub message: String,
    shown_at: Instant,
}

#[derive(Debug, Clone)]
pub struct PresentationState {
    pub input: String,
    pub input_invalid: bool,
    pub loading: bool,
    pub video_loading: bool,
    pub downloading: bool,
    pub show_video: bool,
    pub show_download_modal: bool,
    pub show_cancel_confirm: bool,
    pub metadata: Option<VideoMetadata>,
    /// Download progress in 0..=1.
    pub progress: f64,
    pub speed_bps: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// Preview buffering progress in 0..=1.
    pub buffered: f64,
    pub playable_path: Option<PathBuf>,
    pub error_message: Option<String>,
    alert: Option<Alert>,
    alert_duration: Duration,
    tracked: HashMap<TransferKind, JobId>,
}

impl PresentationState {
    pub fn new(alert_duration: Duration) -> Self {
        Self {
            input: String::new(),
            input_invalid: false,
            loading: false,
            video_loading: false,
            downloading: false,
            show_video: false,
            show_download_modal: false,
            show_cancel_confirm: false,
            metadata: None,
            progress: 0.0,
            speed_bps: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            buffered: 0.0,
            playable_path: None,
            error_message: None,
            alert: None,
            alert_duration,
            tracked: HashMap::new(),
        }
    }

    /// Typing clears the invalid-input highlight.
    pub fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
        self.input_invalid = false;
    }

    pub fn reject_input(&mut self, error: &LinkError) -> String {
        self.input.clear();
        self.input_invalid = true;
        self.show_alert(error.to_string())
    }

    pub fn begin_lookup(&mut self, link: &ShareLink) {
        self.input = link.to_string();
        self.input_invalid = false;
        self.loading = true;
        self.error_message = None;
    }

    pub fn show_metadata(&mut self, metadata: VideoMetadata) {
        self.loading = false;
        self.total_bytes = metadata.size;
        self.metadata = Some(metadata);
    }

    pub fn lookup_failed(&mut self, error: &ResolveError) -> String {
        self.loading = false;
        self.show_alert(format!("Failed to fetch video data: {}", error))
    }

    /// Size of the resolved file as shown on the metadata card.
    pub fn size_label(&self) -> Option<String> {
        self.metadata.as_ref().map(|metadata| format_size(metadata.size))
    }

    pub fn speed_label(&self) -> String {
        format_speed(self.speed_bps)
    }

    pub fn eta(&self) -> Option<Duration> {
        calculate_eta(self.downloaded_bytes, self.total_bytes, self.speed_bps)
    }

    pub fn tracked_job(&self, kind: TransferKind) -> Option<JobId> {
        self.tracked.get(&kind).copied()
    }

    /// Fold one event into the state. Returns the text of an alert raised
    /// by this event, if any.
    pub fn apply(&mut self, event: &TransferEvent) -> Option<String> {
        // Direct `start` calls skip the resolving phase, so a first attempt
        // also counts as the job appearing.
        let kind = event.kind();
        let job = event.job();

        match event {
            TransferEvent::Resolving { .. } | TransferEvent::Started { attempt: 1, .. } => {
                self.tracked.insert(kind, job);
            }
            _ if self.tracked.get(&kind) != Some(&job) => return None,
            _ => {}
        }

        match event {
            TransferEvent::Resolving { kind, .. } => {
                match kind {
                    TransferKind::Preview => {
                        self.show_video = true;
                        self.video_loading = true;
                        self.buffered = 0.0;
                        self.playable_path = None;
                    }
                    TransferKind::Persistent => self.downloading = true,
                }
                self.error_message = None;
                None
            }
            TransferEvent::Started { kind, attempt, .. } => {
                match kind {
                    TransferKind::Preview => {
                        self.show_video = true;
                        self.video_loading = true;
                    }
                    TransferKind::Persistent => {
                        self.downloading = true;
                        self.show_download_modal = true;
                        self.progress = 0.0;
                        self.speed_bps = 0.0;
                        self.downloaded_bytes = 0;
                        if *attempt == 1 {
                            self.total_bytes = self.metadata.as_ref().map_or(0, |m| m.size);
                        }
                    }
                }
                None
            }
            TransferEvent::Progress { kind, progress, .. } => {
                match kind {
                    TransferKind::Preview => self.buffered = progress.fraction,
                    TransferKind::Persistent => {
                        self.progress = progress.fraction;
                        self.downloaded_bytes = progress.bytes_written;
                        self.total_bytes = progress.total_bytes.unwrap_or(0);
                        self.speed_bps = progress.speed_bps;
                    }
                }
                None
            }
            TransferEvent::Playable { path, .. } => {
                self.playable_path = Some(path.clone());
                self.video_loading = false;
                None
            }
            TransferEvent::Retrying { .. } => None,
            TransferEvent::Finished { kind, outcome, .. } => {
                self.tracked.remove(kind);
                self.finish(*kind, outcome)
            }
        }
    }

    fn finish(&mut self, kind: TransferKind, outcome: &TransferOutcome) -> Option<String> {
        match (kind, outcome) {
            (TransferKind::Persistent, TransferOutcome::Completed(path)) => {
                self.show_download_modal = false;
                self.downloading = false;
                self.progress = 1.0;
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                Some(self.show_alert(format!("Download completed: {}", file_name)))
            }
            (TransferKind::Persistent, TransferOutcome::Failed(reason)) => {
                self.show_download_modal = false;
                self.downloading = false;
                let message = format!("Download failed: {}", reason);
                self.error_message = Some(message.clone());
                Some(self.show_alert(message))
            }
            (TransferKind::Persistent, TransferOutcome::Cancelled(_)) => {
                self.clear_download();
                None
            }
            (TransferKind::Preview, TransferOutcome::Completed(_)) => {
                self.video_loading = false;
                self.buffered = 1.0;
                None
            }
            (TransferKind::Preview, TransferOutcome::Failed(reason)) => {
                self.video_loading = false;
                self.playable_path = None;
                self.error_message = Some("Failed to load video".to_string());
                Some(self.show_alert(format!("Failed to load video: {}", reason)))
            }
            (TransferKind::Preview, TransferOutcome::Cancelled(_)) => {
                self.video_loading = false;
                self.playable_path = None;
                None
            }
        }
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_ref().map(|alert| alert.message.as_str())
    }

    pub fn show_alert(&mut self, message: String) -> String {
        self.alert = Some(Alert {
            message: message.clone(),
            shown_at: Instant::now(),
        });
        message
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    /// Drop the alert once it has been visible for the configured duration.
    pub fn tick(&mut self) {
        let expired = self
            .alert
            .as_ref()
            .is_some_and(|alert| alert.shown_at.elapsed() >= self.alert_duration);
        if expired {
            self.alert = None;
        }
    }

    /// The "next" action: reset the screen, unless a download is running,
    /// in which case ask for cancel confirmation first.
    pub fn request_next(&mut self) -> bool {
        if self.downloading {
            self.show_cancel_confirm = true;
            return false;
        }
        self.reset();
        true
    }

    pub fn dismiss_cancel_confirm(&mut self) {
        self.show_cancel_confirm = false;
    }

    /// Reflect a confirmed user cancellation before the session reports it.
    pub fn confirm_cancel(&mut self) {
        self.show_cancel_confirm = false;
        self.tracked.remove(&TransferKind::Persistent);
        self.clear_download();
        self.error_message = None;
    }

    pub fn reset(&mut self) {
        let alert = self.alert.take();
        *self = Self::new(self.alert_duration);
        self.alert = alert;
    }

    fn clear_download(&mut self) {
        self.downloading = false;
        self.show_download_modal = false;
        self.progress = 0.0;
        self.downloaded_bytes = 0;
        self.speed_bps = 0.0;
        self.total_bytes = self.metadata.as_ref().map_or(0, |m| m.size);
    }
}

impl Default for PresentationState {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{CancelReason, ProgressSnapshot};

    fn progress(bytes_written: u64, total: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_written,
            total_bytes: Some(total),
            fraction: bytes_written as f64 / total as f64,
            speed_bps: 1_000.0,
        }
    }

    fn started(job: JobId, kind: TransferKind) -> TransferEvent {
        TransferEvent::Started {
            job,
            kind,
            source_url: "https://cdn.example.com/v.mp4".to_string(),
            destination: PathBuf::from("/tmp/v.mp4"),
            attempt: 1,
        }
    }

    #[test]
    fn test_metadata_card_shows_binary_gigabytes() {
        let mut state = PresentationState::default();
        state.show_metadata(VideoMetadata {
            title: "movie.mp4".to_string(),
            size: 1_073_741_824,
        });
        assert_eq!(state.size_label().as_deref(), Some("1.00GB"));
    }

    #[test]
    fn test_invalid_input_is_cleared_and_flagged() {
        let mut state = PresentationState::default();
        state.set_input("nonsense");

        let alert = state.reject_input(&LinkError::Empty);
        assert_eq!(alert, "Please enter a TeraBox link");
        assert!(state.input.is_empty());
        assert!(state.input_invalid);
        assert_eq!(state.alert(), Some("Please enter a TeraBox link"));

        state.set_input("h");
        assert!(!state.input_invalid);
    }

    #[test]
    fn test_download_progress_and_completion() {
        let mut state = PresentationState::default();
        let job = JobId::new();

        state.apply(&started(job, TransferKind::Persistent));
        assert!(state.show_download_modal);

        state.apply(&TransferEvent::Progress {
            job,
            kind: TransferKind::Persistent,
            progress: progress(500, 1000),
        });
        assert_eq!(state.progress, 0.5);
        assert_eq!(state.downloaded_bytes, 500);
        assert_eq!(state.total_bytes, 1000);

        let alert = state.apply(&TransferEvent::Finished {
            job,
            kind: TransferKind::Persistent,
            outcome: TransferOutcome::Completed(PathBuf::from("/downloads/movie.mp4")),
        });
        assert_eq!(alert.as_deref(), Some("Download completed: movie.mp4"));
        assert!(!state.show_download_modal);
        assert!(!state.downloading);
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let mut state = PresentationState::default();
        let old = JobId::new();
        let new = JobId::new();

        state.apply(&started(old, TransferKind::Persistent));
        state.apply(&started(new, TransferKind::Persistent));

        state.apply(&TransferEvent::Progress {
            job: old,
            kind: TransferKind::Persistent,
            progress: progress(900, 1000),
        });
        assert_eq!(state.progress, 0.0);

        let alert = state.apply(&TransferEvent::Finished {
            job: old,
            kind: TransferKind::Persistent,
            outcome: TransferOutcome::Failed("boom".to_string()),
        });
        assert!(alert.is_none());
        assert!(state.downloading);
        assert_eq!(state.tracked_job(TransferKind::Persistent), Some(new));
    }

    #[test]
    fn test_cancellation_is_silent() {
        let mut state = PresentationState::default();
        let job = JobId::new();
        state.apply(&started(job, TransferKind::Persistent));

        let alert = state.apply(&TransferEvent::Finished {
            job,
            kind: TransferKind::Persistent,
            outcome: TransferOutcome::Cancelled(CancelReason::UserRequested),
        });
        assert!(alert.is_none());
        assert!(state.alert().is_none());
        assert!(state.error_message.is_none());
        assert!(!state.downloading);
    }

    #[test]
    fn test_next_asks_for_confirmation_while_downloading() {
        let mut state = PresentationState::default();
        state.set_input("https://1024terabox.com/s/abc");
        state.apply(&started(JobId::new(), TransferKind::Persistent));

        assert!(!state.request_next());
        assert!(state.show_cancel_confirm);

        state.confirm_cancel();
        assert!(state.request_next());
        assert!(state.input.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_auto_dismisses() {
        let mut state = PresentationState::new(Duration::from_secs(3));
        state.show_alert("Clipboard is empty".to_string());

        tokio::time::advance(Duration::from_secs(2)).await;
        state.tick();
        assert_eq!(state.alert(), Some("Clipboard is empty"));

        tokio::time::advance(Duration::from_secs(1)).await;
        state.tick();
        assert!(state.alert().is_none());
    }
}
