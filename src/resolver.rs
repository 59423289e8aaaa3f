use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ApiConfig;
use crate::link::ShareLink;

/// Display metadata of a shared file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP error! Status: {status}, Details: {details}")]
    Http { status: u16, details: String },
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid video data: {0}")]
    Api(String),
    #[error("No download URL returned")]
    MissingDirectUrl,
}

#[derive(Serialize)]
struct LinkPayload<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct FileListResponse {
    status: Option<String>,
    list: Option<Vec<FileEntry>>,
}

#[derive(Deserialize)]
struct FileEntry {
    name: String,
    size: SizeField,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeField {
    Integer(u64),
    Float(f64),
    Text(String),
}

#[derive(Deserialize)]
struct DirectLinkResponse {
    download_link: Option<DirectLinks>,
}

#[derive(Deserialize)]
struct DirectLinks {
    url_2: Option<String>,
}

/// Client for the remote share-link API.
pub struct LinkResolver {
    client: Client,
    base_url: String,
    metadata_path: String,
    link_path: String,
}

impl LinkResolver {
    pub fn new(config: &ApiConfig) -> Result<Self, ResolveError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder()
            .default_headers(headers)
            .user_agent(crate::USER_AGENT);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder.build().map_err(ResolveError::Client)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &ApiConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            metadata_path: config.metadata_path.clone(),
            link_path: config.link_path.clone(),
        }
    }

    /// Fetch the title and size of the first file behind a share link.
    pub async fn resolve_metadata(&self, link: &ShareLink) -> Result<VideoMetadata, ResolveError> {
        debug!("Sending metadata request with URL: {}", link);
        let (status, body) = self.post(&self.metadata_path, link).await?;

        if !status.is_success() {
            return Err(ResolveError::Http {
                status: status.as_u16(),
                details: body,
            });
        }

        let response: FileListResponse = serde_json::from_str(&body)?;
        parse_file_list(response)
    }

    /// Exchange a share link for a direct media URL.
    pub async fn resolve_direct_url(&self, link: &ShareLink) -> Result<String, ResolveError> {
        debug!("Sending download request with payload: {{ url: {} }}", link);
        let (status, body) = self.post(&self.link_path, link).await?;

        if !status.is_success() {
            return Err(ResolveError::Http {
                status: status.as_u16(),
                details: error_details(&body),
            });
        }

        let response: DirectLinkResponse = serde_json::from_str(&body)?;
        response
            .download_link
            .and_then(|links| links.url_2)
            .filter(|url| !url.trim().is_empty())
            .ok_or(ResolveError::MissingDirectUrl)
    }

    async fn post(
        &self,
        path: &str,
        link: &ShareLink,
    ) -> Result<(reqwest::StatusCode, String), ResolveError> {
        let endpoint = format!("{}{}", self.base_url, path);
        let request_error = |source| ResolveError::Request {
            endpoint: endpoint.clone(),
            source,
        };

        let response = self
            .client
            .post(&endpoint)
            .json(&LinkPayload {
                url: link.as_str(),
            })
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;
        debug!("{} responded {}: {}", endpoint, status, body);

        Ok((status, body))
    }
}

fn parse_file_list(response: FileListResponse) -> Result<VideoMetadata, ResolveError> {
    let status = response.status.unwrap_or_default();
    if status != "success" {
        return Err(ResolveError::Api(format!("API status: {}", status)));
    }

    let list = response
        .list
        .ok_or_else(|| ResolveError::Api("No list in response".to_string()))?;
    let first = list
        .into_iter()
        .next()
        .ok_or_else(|| ResolveError::Api("Empty list in response".to_string()))?;

    let size = match first.size {
        SizeField::Integer(size) => size,
        SizeField::Float(size) if size.is_finite() && size >= 0.0 => size.trunc() as u64,
        SizeField::Float(size) => {
            return Err(ResolveError::Api(format!("Invalid size: {}", size)));
        }
        SizeField::Text(text) => parse_leading_integer(&text)
            .ok_or_else(|| ResolveError::Api(format!("Invalid size: {:?}", text)))?,
    };

    Ok(VideoMetadata {
        title: first.name,
        size,
    })
}

/// Parse the leading run of digits, ignoring surrounding whitespace.
fn parse_leading_integer(text: &str) -> Option<u64> {
    let trimmed = text.trim();
    let digits = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .map_or(trimmed, |end| &trimmed[..end]);
    digits.parse().ok()
}

/// Prefer the `detail` field of a JSON error body, then the JSON itself,
/// then the raw text.
fn error_details(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(mut map)) => match map.remove("detail") {
            Some(detail) => detail.to_string(),
            None => Value::Object(map).to_string(),
        },
        Ok(other) => other.to_string(),
        Err(_) => body.to_string(),
    }
}
