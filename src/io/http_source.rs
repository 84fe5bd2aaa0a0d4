use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_RANGE, ETAG, EXPIRES, PRAGMA,
    RANGE,
};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::source::{cancellable, etag_mismatch, range_header, strong_etag, RangeResponse, Source};
use crate::error::IoError;

/// Whether the next request must bypass intermediary caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    /// Requests may be answered by caches
    Normal,
    /// A stale response was detected; the next request asks for a fresh copy
    ForceReload,
}

/// HTTP-backed implementation of [`Source`].
///
/// Reads byte ranges from an archive served by any HTTP origin or CDN that
/// supports byte serving.
pub struct HttpSource {
    client: Client,
    url: String,
    headers: HeaderMap,
    state: Mutex<ReloadState>,
}

impl HttpSource {
    /// Create a source for `url` with a default client.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    /// Create a source for `url` sharing an existing client.
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            headers: HeaderMap::new(),
            state: Mutex::new(ReloadState::Normal),
        }
    }

    /// Send these headers with every request.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Get the archive URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current reload state.
    pub async fn reload_state(&self) -> ReloadState {
        *self.state.lock().await
    }

    async fn send(&self, range: String, reload: bool) -> Result<Response, IoError> {
        let mut headers = self.headers.clone();
        let range = HeaderValue::from_str(&range)
            .map_err(|e| IoError::Connection(format!("invalid range header: {}", e)))?;
        headers.insert(RANGE, range);
        if reload {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }

        self.client
            .get(&self.url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))
    }

    async fn fetch(
        &self,
        offset: u64,
        length: u64,
        etag: Option<&str>,
    ) -> Result<RangeResponse, IoError> {
        if length == 0 {
            return Ok(RangeResponse::new(Bytes::new()));
        }

        let mut reload = self.reload_state().await == ReloadState::ForceReload;
        debug!(url = %self.url, offset, length, reload, "Fetching byte range");

        let mut resp = self.send(range_header(offset, length)?, reload).await?;

        // Archives smaller than the initial header read answer 416; retry with
        // the real size.
        if offset == 0 && resp.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            let total = unsatisfied_range_length(resp.headers())?;
            if total == 0 {
                return Ok(RangeResponse::new(Bytes::new()));
            }
            reload = true;
            resp = self.send(range_header(0, total)?, true).await?;
        }

        let new_etag = strong_etag(header_str(resp.headers(), ETAG));

        // Some stores answer 416 once the object has been replaced
        if resp.status() == StatusCode::RANGE_NOT_SATISFIABLE
            || etag_mismatch(etag, new_etag.as_deref())
        {
            *self.state.lock().await = ReloadState::ForceReload;
            warn!(
                url = %self.url,
                status = resp.status().as_u16(),
                expected = ?etag,
                actual = ?new_etag,
                "Archive changed while reading, forcing reload"
            );
            return Err(IoError::EtagMismatch {
                expected: etag.map(str::to_string),
                actual: new_etag,
            });
        }

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(IoError::NotFound(self.url.clone()));
        }
        if resp.status().as_u16() >= 300 {
            return Err(IoError::BadStatus(resp.status().as_u16()));
        }

        // A 200 is fine from well-behaved CDNs, but not if it carries the
        // whole object.
        if resp.status() == StatusCode::OK {
            let content_length =
                header_str(resp.headers(), CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok());
            match content_length {
                Some(len) if len <= length => {}
                _ => {
                    return Err(IoError::RangeUnsupported {
                        requested: length,
                        content_length,
                    })
                }
            }
        }

        let cache_control = header_str(resp.headers(), CACHE_CONTROL).map(str::to_string);
        let expires = header_str(resp.headers(), EXPIRES).map(str::to_string);

        let data = resp
            .bytes()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?;

        if reload {
            *self.state.lock().await = ReloadState::Normal;
        }

        Ok(RangeResponse {
            data,
            etag: new_etag,
            cache_control,
            expires,
        })
    }
}

#[async_trait]
impl Source for HttpSource {
    async fn get_bytes(
        &self,
        offset: u64,
        length: u64,
        cancel: Option<&CancellationToken>,
        etag: Option<&str>,
    ) -> Result<RangeResponse, IoError> {
        cancellable(cancel, self.fetch(offset, length, etag)).await
    }

    fn key(&self) -> &str {
        &self.url
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse the total length out of `Content-Range: bytes */<length>`.
fn unsatisfied_range_length(headers: &HeaderMap) -> Result<u64, IoError> {
    header_str(headers, CONTENT_RANGE)
        .and_then(|v| v.strip_prefix("bytes */"))
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| IoError::Connection("Missing content-length on 416 response".to_string()))
}
