use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, RwLock};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::session::{CancelSignal, StateBoard, TransferSession, discard_file};
use super::{
    CancelReason, HttpTransport, JobId, TransferError, TransferEvent, TransferKind,
    TransferOptions, TransferOutcome, TransferRequest, TransferState, Transport,
};
use crate::config::Config;
use crate::error::Error;
use crate::link::ShareLink;
use crate::presentation::PresentationState;
use crate::resolver::{LinkResolver, ResolveError, VideoMetadata};

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9.-]").expect("file name pattern is valid"));

const DEFAULT_FILE_NAME: &str = "video.mp4";
const DEFAULT_PREVIEW_EXTENSION: &str = "mp4";

struct ActiveJob {
    id: JobId,
    destination: PathBuf,
    signal: CancelSignal,
    /// `None` while the direct URL is still being resolved.
    handle: Option<JoinHandle<TransferOutcome>>,
}

/// Owns at most one job per [`TransferKind`] and reports everything that
/// happens to them as [`TransferEvent`]s.
pub struct TransferController {
    config: Config,
    resolver: LinkResolver,
    transport: Arc<dyn Transport>,
    preview_dir: PathBuf,
    events: mpsc::UnboundedSender<TransferEvent>,
    jobs: Mutex<HashMap<TransferKind, ActiveJob>>,
    board: StateBoard,
    metadata: RwLock<Option<VideoMetadata>>,
}

impl TransferController {
    pub fn new(config: Config) -> Result<(Self, mpsc::UnboundedReceiver<TransferEvent>), Error> {
        let resolver = LinkResolver::new(&config.api)?;
        let transport = Arc::new(HttpTransport::new(config.transfer.progress_interval()));
        Ok(Self::with_parts(config, resolver, transport))
    }

    pub fn with_parts(
        config: Config,
        resolver: LinkResolver,
        transport: Arc<dyn Transport>,
    ) -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();

        let controller = Self {
            config,
            resolver,
            transport,
            preview_dir: std::env::temp_dir().join("sharefetch"),
            events,
            jobs: Mutex::new(HashMap::new()),
            board: StateBoard::default(),
            metadata: RwLock::new(None),
        };

        (controller, receiver)
    }

    /// Directory for auto-named preview files.
    pub fn with_preview_dir(mut self, preview_dir: PathBuf) -> Self {
        self.preview_dir = preview_dir;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self, kind: TransferKind) -> TransferState {
        self.board.state(kind)
    }

    pub fn active_job(&self, kind: TransferKind) -> Option<JobId> {
        self.board.running_job(kind)
    }

    /// Metadata from the most recent successful lookup.
    pub fn metadata(&self) -> Option<VideoMetadata> {
        self.metadata
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Fetch metadata for a link and keep it for naming and size fallback.
    pub async fn lookup(&self, link: &ShareLink) -> Result<VideoMetadata, ResolveError> {
        let metadata = self.resolver.resolve_metadata(link).await?;
        info!("Resolved {}: {:?}", link, metadata);

        *self.metadata.write().unwrap_or_else(|e| e.into_inner()) = Some(metadata.clone());
        Ok(metadata)
    }

    /// Validate raw input and look it up, mirroring every step in `state`.
    ///
    /// Invalid input never reaches the network.
    pub async fn get_video(
        &self,
        raw: &str,
        state: &mut PresentationState,
    ) -> Result<VideoMetadata, Error> {
        let link = match ShareLink::parse(raw) {
            Ok(link) => link,
            Err(e) => {
                state.reject_input(&e);
                return Err(e.into());
            }
        };

        state.begin_lookup(&link);
        match self.lookup(&link).await {
            Ok(metadata) => {
                state.show_metadata(metadata.clone());
                Ok(metadata)
            }
            Err(e) => {
                state.lookup_failed(&e);
                Err(e.into())
            }
        }
    }

    /// Resolve the direct URL and start buffering it into a temporary file.
    pub async fn play(&self, link: &ShareLink) -> Result<JobId, Error> {
        let destination = self.preview_destination();
        self.resolve_and_launch(link, TransferKind::Preview, destination)
            .await
    }

    /// Resolve the direct URL and download it into the download directory.
    pub async fn download(&self, link: &ShareLink) -> Result<JobId, Error> {
        let destination = self.download_destination();
        self.resolve_and_launch(link, TransferKind::Persistent, destination)
            .await
    }

    /// Start a job of `kind`, cancelling any job of the same kind first.
    pub async fn start(
        &self,
        source_url: &str,
        destination: PathBuf,
        kind: TransferKind,
        options: TransferOptions,
    ) -> Result<JobId, TransferError> {
        if source_url.trim().is_empty() {
            return Err(TransferError::EmptySource);
        }

        let id = JobId::new();
        let mut jobs = self.jobs.lock().await;
        self.supersede(&mut jobs, kind, id).await;

        let request = options.request(source_url, destination);
        self.launch(&mut jobs, id, kind, request, options, CancelSignal::default());
        Ok(id)
    }

    /// Cancel the job of `kind`, if any, including one still resolving.
    /// Returns whether a job was running.
    pub async fn cancel(&self, kind: TransferKind, reason: CancelReason) -> bool {
        let job = {
            let mut jobs = self.jobs.lock().await;
            let job = jobs.remove(&kind);
            if let Some(job) = &job {
                job.signal.cancel(reason);
            }
            job
        };

        match job {
            Some(job) => {
                let was_running = job
                    .handle
                    .as_ref()
                    .is_none_or(|handle| !handle.is_finished());
                self.retire(kind, job, reason).await;
                was_running
            }
            None => false,
        }
    }

    /// Cancel every job and remove preview files.
    pub async fn shutdown(&self) {
        let jobs: Vec<_> = {
            let mut jobs = self.jobs.lock().await;
            jobs.drain()
                .inspect(|(_, job)| job.signal.cancel(CancelReason::Shutdown))
                .collect()
        };
        for (kind, job) in jobs {
            self.retire(kind, job, CancelReason::Shutdown).await;
        }
    }

    /// Temporary, auto-named file for a preview.
    pub fn preview_destination(&self) -> PathBuf {
        let extension = self
            .metadata()
            .and_then(|metadata| {
                Path::new(&metadata.title)
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
                    .map(str::to_lowercase)
            })
            .unwrap_or_else(|| DEFAULT_PREVIEW_EXTENSION.to_string());

        self.preview_dir
            .join(format!("preview-{}.{}", Uuid::new_v4().simple(), extension))
    }

    /// Download-directory path named after the sanitized metadata title.
    pub fn download_destination(&self) -> PathBuf {
        let file_name = self
            .metadata()
            .map(|metadata| sanitize_file_name(&metadata.title))
            .filter(|name| !name.chars().all(|c| c == '.'))
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

        self.config
            .transfer
            .resolved_download_dir()
            .join(file_name)
    }

    fn options(&self) -> TransferOptions {
        TransferOptions::from_config(&self.config)
            .with_expected_size(self.metadata().map(|metadata| metadata.size))
    }

    /// Supersede the current job of `kind`, register the new one as
    /// resolving, then spawn it once the direct URL is known. A cancel
    /// that lands while resolving finishes the job without a transfer.
    async fn resolve_and_launch(
        &self,
        link: &ShareLink,
        kind: TransferKind,
        destination: PathBuf,
    ) -> Result<JobId, Error> {
        let id = JobId::new();
        let signal = CancelSignal::default();

        {
            let mut jobs = self.jobs.lock().await;
            self.supersede(&mut jobs, kind, id).await;

            self.board.claim(kind, id, TransferState::Resolving);
            self.emit(TransferEvent::Resolving { job: id, kind });
            jobs.insert(
                kind,
                ActiveJob {
                    id,
                    destination: destination.clone(),
                    signal: signal.clone(),
                    handle: None,
                },
            );
        }

        let source_url = match self.resolver.resolve_direct_url(link).await {
            Ok(url) => url,
            Err(e) => {
                self.release(kind, id).await;
                if let Some(reason) = signal.reason() {
                    self.finish_unlaunched(kind, id, TransferOutcome::Cancelled(reason));
                    return Ok(id);
                }

                warn!("Failed to initiate {}: {}", kind, e);
                self.finish_unlaunched(kind, id, TransferOutcome::Failed(e.to_string()));
                return Err(e.into());
            }
        };
        debug!("Direct URL for {}: {}", link, source_url);

        let options = self.options();
        let mut jobs = self.jobs.lock().await;
        // `cancel`, `shutdown` and a superseding job all trigger the signal
        // under this lock, so an untriggered signal means the entry is ours.
        if let Some(reason) = signal.reason() {
            drop(jobs);
            info!("{} {} cancelled while resolving", kind, id);
            self.finish_unlaunched(kind, id, TransferOutcome::Cancelled(reason));
            return Ok(id);
        }

        let request = options.request(&source_url, destination);
        self.launch(&mut jobs, id, kind, request, options, signal);
        Ok(id)
    }

    async fn supersede(
        &self,
        jobs: &mut HashMap<TransferKind, ActiveJob>,
        kind: TransferKind,
        id: JobId,
    ) {
        if let Some(previous) = jobs.remove(&kind) {
            info!("Superseding {} {} with {}", kind, previous.id, id);
            self.retire(kind, previous, CancelReason::Superseded).await;
        }
    }

    fn launch(
        &self,
        jobs: &mut HashMap<TransferKind, ActiveJob>,
        id: JobId,
        kind: TransferKind,
        request: TransferRequest,
        options: TransferOptions,
        signal: CancelSignal,
    ) {
        let destination = request.destination.clone();
        let session = TransferSession {
            id,
            kind,
            request,
            options,
            transport: Arc::clone(&self.transport),
            signal: signal.clone(),
            events: self.events.clone(),
            board: self.board.clone(),
        };

        self.board.claim(kind, id, TransferState::Active);
        info!("Starting {} {} -> {:?}", kind, id, destination);
        let handle = tokio::spawn(session.run());

        jobs.insert(
            kind,
            ActiveJob {
                id,
                destination,
                signal,
                handle: Some(handle),
            },
        );
    }

    /// Drop the resolving entry of `id`, unless something replaced it.
    async fn release(&self, kind: TransferKind, id: JobId) {
        let mut jobs = self.jobs.lock().await;
        if jobs.get(&kind).is_some_and(|job| job.id == id) {
            jobs.remove(&kind);
        }
    }

    /// Report the end of a job that never reached the transport.
    fn finish_unlaunched(&self, kind: TransferKind, id: JobId, outcome: TransferOutcome) {
        self.board.update(kind, id, outcome.state());
        self.emit(TransferEvent::Finished {
            job: id,
            kind,
            outcome,
        });
    }

    /// Cancel a job, wait for its task to stop and drop its preview file.
    async fn retire(&self, kind: TransferKind, job: ActiveJob, reason: CancelReason) {
        job.signal.cancel(reason);

        if let Some(handle) = job.handle {
            if let Err(e) = handle.await {
                warn!("{} {} ended abnormally: {}", kind, job.id, e);
            }
        }

        if kind == TransferKind::Preview {
            discard_file(&job.destination).await;
        }
    }

    fn emit(&self, event: TransferEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for TransferController {
    fn drop(&mut self) {
        // Best effort when `shutdown` was not awaited: stop the tasks and
        // remove whatever preview file is left.
        for (kind, job) in self.jobs.get_mut().drain() {
            job.signal.cancel(CancelReason::Shutdown);
            if kind == TransferKind::Preview {
                if let Err(e) = std::fs::remove_file(&job.destination) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to delete temporary file {:?}: {}", job.destination, e);
                    }
                }
            }
        }
    }
}

/// Replace everything outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_file_name(title: &str) -> String {
    UNSAFE_FILENAME_CHARS.replace_all(title, "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("movie.mp4"), "movie.mp4");
        assert_eq!(sanitize_file_name("My Movie (2024).mkv"), "My_Movie__2024_.mkv");
        assert_eq!(sanitize_file_name("../etc/passwd"), ".._etc_passwd");
    }
}
