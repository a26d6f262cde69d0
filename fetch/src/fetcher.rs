//! One-shot HTTP GET with every failure encoded in the result.
//!
//! The fetcher never returns an error: protocol failures carry the real
//! status code with empty fields, transport failures (DNS, connect, reset)
//! carry no status at all. The dispatcher decides what each shape means.

use std::time::Duration;

use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use url::Url;

/// User-agent sent with every request, including robots.txt lookups.
pub const USER_AGENT: &str = concat!("trawl/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything one fetch produced.
///
/// `status: None` means the server was unreachable. A present non-2xx status
/// leaves all other fields empty.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub status: Option<u16>,
    pub mime: Option<String>,
    pub filename: Option<String>,
    pub body: Vec<u8>,
    /// Charset from the Content-Type header, if the server declared one.
    pub charset: Option<String>,
}

impl FetchOutcome {
    fn unreachable() -> Self {
        Self::default()
    }

    fn protocol_error(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// The underlying client, shared with the robots cache so both ends of
    /// the politeness layer present the same identity.
    #[must_use]
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// Fetch one URL. Infallible by contract; see [`FetchOutcome`].
    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(%url, error = %err, "unreachable");
                return FetchOutcome::unreachable();
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%url, status = status.as_u16(), "protocol error");
            return FetchOutcome::protocol_error(status.as_u16());
        }

        let (mime, charset) = parse_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let filename = filename_from_disposition(
            response
                .headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok()),
        )
        .or_else(|| filename_from_url(url));

        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                tracing::debug!(%url, error = %err, "body read failed");
                return FetchOutcome::unreachable();
            }
        };

        FetchOutcome {
            status: Some(status.as_u16()),
            mime,
            filename,
            body,
            charset,
        }
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a Content-Type header into (mime, charset), both lowercased.
fn parse_content_type(header: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(header) = header else {
        return (None, None);
    };

    let mut parts = header.split(';');
    let mime = parts
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_ascii_lowercase);

    let charset = parts.find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_ascii_lowercase())
        } else {
            None
        }
    });

    (mime, charset)
}

/// Extract a filename from a Content-Disposition header, if present.
fn filename_from_disposition(header: Option<&str>) -> Option<String> {
    let header = header?;
    header.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("filename") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

/// Fall back to the last path segment of the URL.
fn filename_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(ToString::to_string)
}
