use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use super::{JobId, TransferKind, TransferOutcome};

/// Events emitted by the controller and its sessions, tagged with the job
/// they belong to so consumers can drop stale ones.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Resolving {
        job: JobId,
        kind: TransferKind,
    },
    Started {
        job: JobId,
        kind: TransferKind,
        source_url: String,
        destination: PathBuf,
        /// 1 for the first try, incremented on every retry.
        attempt: u32,
    },
    Progress {
        job: JobId,
        kind: TransferKind,
        progress: ProgressSnapshot,
    },
    Playable {
        job: JobId,
        kind: TransferKind,
        path: PathBuf,
    },
    Retrying {
        job: JobId,
        kind: TransferKind,
        attempt: u32,
        retries_remaining: u32,
        delay: Duration,
        error: String,
    },
    Finished {
        job: JobId,
        kind: TransferKind,
        outcome: TransferOutcome,
    },
}

impl TransferEvent {
    pub fn job(&self) -> JobId {
        match self {
            TransferEvent::Resolving { job, .. }
            | TransferEvent::Started { job, .. }
            | TransferEvent::Progress { job, .. }
            | TransferEvent::Playable { job, .. }
            | TransferEvent::Retrying { job, .. }
            | TransferEvent::Finished { job, .. } => *job,
        }
    }

    pub fn kind(&self) -> TransferKind {
        match self {
            TransferEvent::Resolving { kind, .. }
            | TransferEvent::Started { kind, .. }
            | TransferEvent::Progress { kind, .. }
            | TransferEvent::Playable { kind, .. }
            | TransferEvent::Retrying { kind, .. }
            | TransferEvent::Finished { kind, .. } => *kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub bytes_written: u64,
    /// Content length when the transfer reports one, else the size known
    /// from metadata.
    pub total_bytes: Option<u64>,
    /// 0.0 when the content length is unknown.
    pub fraction: f64,
    pub speed_bps: f64,
}

/// Turns raw `(bytes_written, content_length)` callbacks into progress
/// snapshots. Speed is re-sampled at most once per `interval`; callbacks in
/// between reuse the last reading.
#[derive(Debug, Clone)]
pub struct ProgressSampler {
    interval: Duration,
    fallback_total: Option<u64>,
    last_sample_at: Instant,
    last_sample_bytes: u64,
    speed_bps: f64,
}

impl ProgressSampler {
    pub fn new(interval: Duration, fallback_total: Option<u64>, now: Instant) -> Self {
        Self {
            interval,
            fallback_total,
            last_sample_at: now,
            last_sample_bytes: 0,
            speed_bps: 0.0,
        }
    }

    /// Start over for a new attempt that writes from byte zero.
    pub fn restart(&mut self, now: Instant) {
        self.last_sample_at = now;
        self.last_sample_bytes = 0;
        self.speed_bps = 0.0;
    }

    pub fn observe(
        &mut self,
        bytes_written: u64,
        content_length: Option<u64>,
        now: Instant,
    ) -> ProgressSnapshot {
        let content_length = content_length.filter(|len| *len > 0);
        let fraction = match content_length {
            Some(len) => (bytes_written as f64 / len as f64).min(1.0),
            None => 0.0,
        };

        let elapsed = now.saturating_duration_since(self.last_sample_at);
        if elapsed >= self.interval {
            let secs = elapsed.as_secs_f64();
            self.speed_bps = if secs > 0.0 {
                bytes_written.saturating_sub(self.last_sample_bytes) as f64 / secs
            } else {
                0.0
            };
            self.last_sample_at = now;
            self.last_sample_bytes = bytes_written;
        }

        ProgressSnapshot {
            bytes_written,
            total_bytes: content_length.or(self.fallback_total),
            fraction,
            speed_bps: self.speed_bps,
        }
    }
}

/// Bytes a preview must buffer before playback may start.
pub fn playable_threshold(total_bytes: Option<u64>, fraction: f64, min_bytes: u64) -> u64 {
    let share = total_bytes.map_or(0, |total| (total as f64 * fraction) as u64);
    share.max(min_bytes)
}

/// Format a size the way the metadata card shows it: `1.00GB`, `512.00MB`.
pub fn format_size(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;

    let bytes = bytes as f64;
    if bytes >= GIB {
        format!("{:.2}GB", bytes / GIB)
    } else {
        format!("{:.2}MB", bytes / MIB)
    }
}

/// Format a transfer rate in megabits per second.
pub fn format_speed(bytes_per_second: f64) -> String {
    format!("{:.2} Mbps", bytes_per_second * 8.0 / 1e6)
}

pub fn calculate_eta(bytes_downloaded: u64, total_bytes: u64, speed_bps: f64) -> Option<Duration> {
    if speed_bps <= 0.0 || total_bytes == 0 || bytes_downloaded >= total_bytes {
        return None;
    }

    let remaining_bytes = (total_bytes - bytes_downloaded) as f64;
    Some(Duration::from_secs((remaining_bytes / speed_bps) as u64))
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
