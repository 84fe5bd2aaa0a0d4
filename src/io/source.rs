use std::future::Future;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::IoError;

/// Bytes returned by a range fetch, with the validators that came with them.
#[derive(Debug, Clone, Default)]
pub struct RangeResponse {
    /// The fetched bytes; may be shorter than requested at end of file
    pub data: Bytes,

    /// Strong validator of the object the bytes came from
    pub etag: Option<String>,

    /// `Cache-Control` reported by the backing store
    pub cache_control: Option<String>,

    /// `Expires` reported by the backing store
    pub expires: Option<String>,
}

impl RangeResponse {
    /// A response carrying only data.
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// Attach an ETag to the response.
    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }
}

/// Trait for fetching byte ranges from an archive's backing store.
///
/// This abstraction lets the archive reader work against remote HTTP
/// origins, object storage, or local files without downloading the whole
/// archive. Implementations must be thread-safe.
#[async_trait]
pub trait Source: Send + Sync {
    /// Fetch up to `length` bytes starting at `offset`.
    ///
    /// When `etag` is given, implementations that can observe the object's
    /// validator must fail with [`IoError::EtagMismatch`] if it differs.
    /// When `cancel` fires before the fetch completes, the fetch is dropped
    /// and the call fails with [`IoError::Cancelled`].
    async fn get_bytes(
        &self,
        offset: u64,
        length: u64,
        cancel: Option<&CancellationToken>,
        etag: Option<&str>,
    ) -> Result<RangeResponse, IoError>;

    /// Stable identity of the archive (used in cache keys and logs).
    ///
    /// For S3, this would typically be `s3://bucket/key`.
    fn key(&self) -> &str;
}

/// Run `fut`, aborting it with [`IoError::Cancelled`] if `cancel` fires first.
pub async fn cancellable<F, T>(cancel: Option<&CancellationToken>, fut: F) -> Result<T, IoError>
where
    F: Future<Output = Result<T, IoError>>,
{
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(IoError::Cancelled),
                result = fut => result,
            }
        }
        None => fut.await,
    }
}

/// Drop weak validators (`W/"..."`); they cannot prove byte-for-byte identity.
pub fn strong_etag(etag: Option<&str>) -> Option<String> {
    etag.filter(|e| !e.starts_with("W/")).map(str::to_string)
}

/// Whether a returned validator contradicts the expected one.
///
/// A missing validator on either side is not a mismatch.
pub fn etag_mismatch(expected: Option<&str>, actual: Option<&str>) -> bool {
    matches!((expected, actual), (Some(e), Some(a)) if e != a)
}

/// Format an HTTP `Range` header value (inclusive on both ends).
pub fn range_header(offset: u64, length: u64) -> Result<String, IoError> {
    let last = offset
        .checked_add(length.max(1) - 1)
        .ok_or(IoError::InvalidRange { offset, length })?;
    Ok(format!("bytes={}-{}", offset, last))
}
