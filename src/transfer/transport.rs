use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{TransferError, TransferRequest};

/// The file-transfer primitive a session drives.
///
/// Implementations report `(bytes_written, content_length)` through
/// `on_progress` and treat `cancel` as a request to stop as soon as
/// possible. The returned value is the number of bytes written.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn transfer(
        &self,
        request: &TransferRequest,
        on_progress: &mut (dyn FnMut(u64, Option<u64>) + Send),
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError>;
}

/// Streams an HTTP GET body into the destination file.
pub struct HttpTransport {
    progress_interval: Duration,
}

impl HttpTransport {
    pub fn new(progress_interval: Duration) -> Self {
        Self { progress_interval }
    }

    fn client(&self, request: &TransferRequest) -> Result<Client, TransferError> {
        Client::builder()
            .connect_timeout(request.connect_timeout)
            .read_timeout(request.read_timeout)
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(TransferError::Client)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn transfer(
        &self,
        request: &TransferRequest,
        on_progress: &mut (dyn FnMut(u64, Option<u64>) + Send),
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let client = self.client(request)?;

        let mut req_builder = client.get(&request.source_url);
        for (name, value) in &request.headers {
            req_builder = req_builder.header(name.as_str(), value.as_str());
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            response = req_builder.send() => response?,
        };

        if !response.status().is_success() {
            return Err(TransferError::Status(response.status().as_u16()));
        }

        let content_length = response.content_length();
        let io_error = |source| TransferError::Io {
            path: request.destination.clone(),
            source,
        };

        if let Some(parent) = request.destination.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = File::create(&request.destination)
            .await
            .map_err(io_error)?;

        let mut written = 0u64;
        let mut last_progress_update = Instant::now();
        on_progress(written, content_length);

        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                next = stream.next() => next,
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;

            if last_progress_update.elapsed() >= self.progress_interval {
                on_progress(written, content_length);
                last_progress_update = Instant::now();
            }
        }

        file.flush().await.map_err(io_error)?;
        on_progress(written, content_length);

        Ok(written)
    }
}
