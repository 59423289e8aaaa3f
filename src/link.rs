use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use regex::Regex;
use reqwest::Url;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

/// Host every canonical share link is rewritten to.
pub const CANONICAL_HOST: &str = "https://1024terabox.com";

/// Tokens identifying the file-hosting service, matched case-insensitively.
pub const SERVICE_MARKERS: &[&str] = &["terabox", "terashare"];

/// Path segment that precedes the share identifier.
pub const SHARE_PATH_MARKER: &str = "/s/";

/// Query parameter used by link proxies to carry the base64-encoded target.
const REDIRECT_PARAM: &str = "url";

static SHARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/s/([^?]+)").expect("share id pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Please enter a TeraBox link")]
    Empty,
    #[error("Please enter a valid TeraBox link (e.g., https://1024terabox.com/s/...)")]
    Invalid { link: String },
}

/// A normalized share link that passed validation.
///
/// The wrapped string always contains [`SHARE_PATH_MARKER`] and one of the
/// [`SERVICE_MARKERS`]; the only way to build one is [`ShareLink::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShareLink(String);

impl ShareLink {
    /// Normalize and validate raw user input.
    pub fn parse(raw: &str) -> Result<Self, LinkError> {
        if raw.trim().is_empty() {
            return Err(LinkError::Empty);
        }

        let normalized = normalize(raw);
        if !is_valid(&normalized) {
            return Err(LinkError::Invalid { link: normalized });
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier following `/s/`, without query or fragment.
    pub fn share_id(&self) -> &str {
        let lower = self.0.to_ascii_lowercase();
        let start = match lower.find(SHARE_PATH_MARKER) {
            Some(index) => index + SHARE_PATH_MARKER.len(),
            None => return "",
        };

        let rest = &self.0[start..];
        let end = rest.find(['?', '#', '/']).unwrap_or(rest.len());
        &rest[..end]
    }
}

impl fmt::Display for ShareLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShareLink {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ShareLink {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Strip proxy wrapping from a pasted link.
///
/// Links shared through redirect proxies carry the real target as a base64
/// payload in a `url` query parameter. When that payload names the service,
/// the share id is extracted into a canonical link; a payload naming the
/// service without a share id is returned as decoded. Anything else,
/// including payloads that fail to decode, leaves the trimmed input as is.
///
/// Unwrapping is repeated until the value stops changing, so the function is
/// idempotent.
pub fn normalize(raw: &str) -> String {
    let mut current = raw.trim().to_string();

    while let Some(unwrapped) = unwrap_redirect(&current) {
        if unwrapped == current {
            break;
        }
        current = unwrapped;
    }

    current
}

/// Case-insensitive check for a service marker and the share path marker.
pub fn is_valid(link: &str) -> bool {
    let lower = link.to_lowercase();
    SERVICE_MARKERS.iter().any(|marker| lower.contains(marker)) && lower.contains(SHARE_PATH_MARKER)
}

fn unwrap_redirect(value: &str) -> Option<String> {
    let url = Url::parse(value).ok()?;
    let encoded = url
        .query_pairs()
        .find(|(key, _)| key == REDIRECT_PARAM)
        .map(|(_, payload)| payload.into_owned())?;

    // Form decoding turns a literal '+' of the standard alphabet into a space.
    let encoded = encoded.trim().replace(' ', "+");

    let Some(decoded) = decode_payload(&encoded) else {
        debug!("Link processing error: {:?} is not a base64 payload", encoded);
        return None;
    };
    let decoded = decoded.trim();

    if !names_service_host(decoded) {
        return None;
    }

    match SHARE_ID.captures(decoded) {
        Some(captures) => Some(format!("{}/s/{}", CANONICAL_HOST, captures[1].trim())),
        None => Some(decoded.to_string()),
    }
}

fn decode_payload(encoded: &str) -> Option<String> {
    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .into_iter()
        .find_map(|engine| engine.decode(encoded).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

fn names_service_host(decoded: &str) -> bool {
    let lower = decoded.to_lowercase();
    lower.contains("terabox.com") || lower.contains("terashare")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxied(target: &str) -> String {
        format!("https://proxy.example.net/r?url={}", STANDARD.encode(target))
    }

    #[test]
    fn test_validation_requires_both_markers() {
        assert!(is_valid("https://1024terabox.com/s/abc123"));
        assert!(is_valid("https://www.TeraShare.com/S/xyz"));
        assert!(is_valid("HTTPS://TERABOX.APP/s/1"));

        assert!(!is_valid("https://1024terabox.com/sharing/abc"));
        assert!(!is_valid("https://example.com/s/abc123"));
        assert!(!is_valid(""));
    }

    #[test]
    fn test_plain_link_is_trimmed_only() {
        assert_eq!(
            normalize("   https://1024terabox.com/s/abc123 \n"),
            "https://1024terabox.com/s/abc123"
        );
        assert_eq!(normalize("not a url"), "not a url");
    }

    #[test]
    fn test_proxied_link_is_unwrapped_to_canonical_form() {
        let link = proxied("https://www.terabox.com/s/1AbCdEf?pwd=1234");
        assert_eq!(normalize(&link), "https://1024terabox.com/s/1AbCdEf");
    }

    #[test]
    fn test_proxied_link_without_share_id_keeps_decoded_value() {
        let link = proxied("https://www.terabox.com/sharing/link?surl=abc");
        assert_eq!(normalize(&link), "https://www.terabox.com/sharing/link?surl=abc");
    }

    #[test]
    fn test_proxy_to_other_host_is_left_alone() {
        let link = proxied("https://example.com/s/abc");
        assert_eq!(normalize(&link), link);
    }

    #[test]
    fn test_undecodable_payload_falls_back_to_input() {
        let link = "https://proxy.example.net/r?url=%%%not-base64%%%";
        assert_eq!(normalize(link), link);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "  https://1024terabox.com/s/abc123  ".to_string(),
            proxied("https://www.terabox.com/s/1AbCdEf?pwd=1234"),
            proxied("https://www.terabox.com/sharing/link?surl=abc"),
            proxied(&proxied("https://terashare.io/s/nested")),
            "https://proxy.example.net/r?url=garbage".to_string(),
            String::new(),
        ];

        for input in inputs {
            let once = normalize(&input);
            assert_eq!(normalize(&once), once, "input: {input}");
        }
    }

    #[test]
    fn test_parse_rejects_empty_and_invalid_input() {
        assert_eq!(ShareLink::parse("   "), Err(LinkError::Empty));
        assert!(matches!(
            ShareLink::parse("https://example.com/file"),
            Err(LinkError::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_extracts_share_id() {
        let link: ShareLink = "https://1024terabox.com/s/abc123?from=app".parse().unwrap();
        assert_eq!(link.share_id(), "abc123");
        assert!(link.as_str().contains(SHARE_PATH_MARKER));
    }
}
