pub mod config;
pub mod error;
pub mod link;
pub mod presentation;
pub mod resolver;
pub mod transfer;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("sharefetch/", env!("CARGO_PKG_VERSION"));

// Re-export commonly used types for easier access in tests
pub use config::{Config, ConfigManager};
pub use error::{Error, Result};
pub use link::{LinkError, ShareLink};
pub use presentation::PresentationState;
pub use resolver::{LinkResolver, ResolveError, VideoMetadata};
pub use transfer::{
    CancelReason, JobId, TransferController, TransferError, TransferEvent, TransferKind,
    TransferOptions, TransferOutcome, TransferState,
};
