pub mod controller;
pub mod progress;
pub mod session;
pub mod transport;

pub use controller::TransferController;
pub use progress::{ProgressSampler, ProgressSnapshot, TransferEvent};
pub use transport::{HttpTransport, Transport};

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;

/// The two job slots owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// Progressive buffering into a temporary file for local playback.
    Preview,
    /// Explicit download into the user's download directory.
    Persistent,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Preview => write!(f, "preview"),
            TransferKind::Persistent => write!(f, "download"),
        }
    }
}

/// Opaque handle tagging every event of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    UserRequested,
    Superseded,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Completed(PathBuf),
    Failed(String),
    Cancelled(CancelReason),
}

impl TransferOutcome {
    pub fn state(&self) -> TransferState {
        match self {
            TransferOutcome::Completed(_) => TransferState::Completed,
            TransferOutcome::Failed(_) => TransferState::Failed,
            TransferOutcome::Cancelled(_) => TransferState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Resolving,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl TransferState {
    pub fn is_running(&self) -> bool {
        matches!(self, TransferState::Resolving | TransferState::Active)
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Source URL cannot be empty")]
    EmptySource,
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP request failed with status: {0}")]
    Status(u16),
    #[error("Failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Transfer cancelled")]
    Cancelled,
}

/// What the transport needs to fetch one file.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source_url: String,
    pub destination: PathBuf,
    pub headers: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

/// Per-job knobs, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub headers: Vec<(String, String)>,
    pub speed_sample_interval: Duration,
    /// Size reported by the metadata endpoint, used when the transfer
    /// omits a content length.
    pub expected_size: Option<u64>,
    pub playable_fraction: f64,
    pub playable_min_bytes: u64,
}

impl TransferOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.transfer.max_retries,
            retry_delay: config.transfer.retry_delay(),
            connect_timeout: config.transfer.connect_timeout(),
            read_timeout: config.transfer.read_timeout(),
            headers: Vec::new(),
            speed_sample_interval: config.transfer.speed_sample_interval(),
            expected_size: None,
            playable_fraction: config.preview.playable_fraction,
            playable_min_bytes: config.preview.playable_min_bytes,
        }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_expected_size(mut self, size: Option<u64>) -> Self {
        self.expected_size = size;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Retry budget for a job of the given kind; previews never retry.
    pub fn retries_for(&self, kind: TransferKind) -> u32 {
        match kind {
            TransferKind::Preview => 0,
            TransferKind::Persistent => self.max_retries,
        }
    }

    pub(crate) fn request(&self, source_url: &str, destination: PathBuf) -> TransferRequest {
        TransferRequest {
            source_url: source_url.to_string(),
            destination,
            headers: self.headers.clone(),
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
        }
    }
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
