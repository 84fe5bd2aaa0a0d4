//! Resolving caches for headers, directories and raw byte ranges.
//!
//! Two interchangeable implementations sit behind [`ArchiveCache`]:
//!
//! - [`ResolvedValueCache`] stores resolved values. Concurrent misses for the
//!   same key each go to the source.
//! - [`SharedPromiseCache`] stores shared futures, so concurrent misses for
//!   the same key await a single fetch.
//!
//! Both evict the least recently used entry once they exceed capacity.

mod resolved;
mod shared;
#[cfg(test)]
pub(crate) mod testing;

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tracing::debug;

use crate::error::{FormatError, TileError};
use crate::format::{check_magic, detect_version, Directory, Header, MAX_SPEC_VERSION};
use crate::io::{Decompress, Source};

pub use resolved::ResolvedValueCache;
pub use shared::SharedPromiseCache;

/// Bytes read from the start of an archive when resolving its header.
///
/// Large enough that writers can place the root directory inside it.
pub const HEADER_FETCH_LENGTH: u64 = 16384;

/// Default number of cache entries for library users.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// An LRU map holding at most `capacity` entries (minimum 1).
pub(crate) fn new_lru<V>(capacity: usize) -> LruCache<String, V> {
    LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
}

/// A value held by an archive cache.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Header(Arc<Header>),
    Directory(Arc<Directory>),
    Bytes(Bytes),
}

impl CachedValue {
    pub(crate) fn into_header(self, key: &str) -> Result<Arc<Header>, TileError> {
        match self {
            CachedValue::Header(header) => Ok(header),
            _ => Err(mismatch(key, "header")),
        }
    }

    pub(crate) fn into_directory(self, key: &str) -> Result<Arc<Directory>, TileError> {
        match self {
            CachedValue::Directory(directory) => Ok(directory),
            _ => Err(mismatch(key, "directory")),
        }
    }

    pub(crate) fn into_bytes(self, key: &str) -> Result<Bytes, TileError> {
        match self {
            CachedValue::Bytes(bytes) => Ok(bytes),
            _ => Err(mismatch(key, "byte range")),
        }
    }
}

fn mismatch(key: &str, expected: &'static str) -> TileError {
    TileError::CacheEntryMismatch {
        key: key.to_string(),
        expected,
    }
}

/// Cache of archive structures shared across readers.
///
/// Sources are passed as `Arc` so implementations may move them into
/// background fetches.
#[async_trait]
pub trait ArchiveCache: Send + Sync {
    /// Resolve the header of `source`.
    async fn get_header(&self, source: &Arc<dyn Source>) -> Result<Arc<Header>, TileError>;

    /// Resolve the directory stored at `offset..offset + length`.
    async fn get_directory(
        &self,
        source: &Arc<dyn Source>,
        offset: u64,
        length: u64,
        header: &Header,
    ) -> Result<Arc<Directory>, TileError>;

    /// Resolve a raw byte range, validated against the header's ETag.
    async fn get_bytes(
        &self,
        source: &Arc<dyn Source>,
        offset: u64,
        length: u64,
        header: &Header,
    ) -> Result<Bytes, TileError>;

    /// Drop the cached header of `source` and fetch it again.
    async fn invalidate(&self, source: &Arc<dyn Source>) -> Result<(), TileError>;
}

/// Cache key for a directory or byte range.
pub fn range_key(source_key: &str, etag: Option<&str>, offset: u64, length: u64) -> String {
    format!("{}|{}|{}|{}", source_key, etag.unwrap_or(""), offset, length)
}

/// A freshly fetched header, plus the root directory when it was prefetched.
pub(crate) struct HeaderFetch {
    pub header: Arc<Header>,
    pub root: Option<(String, Arc<Directory>)>,
}

/// Fetch and decode the header of `source`.
pub(crate) async fn fetch_header(
    source: &dyn Source,
    prefetch: bool,
    decompressor: &dyn Decompress,
) -> Result<HeaderFetch, TileError> {
    debug!(source = %source.key(), "Fetching header");
    let resp = source.get_bytes(0, HEADER_FETCH_LENGTH, None, None).await?;
    let data = resp.data;

    check_magic(&data)?;
    let version = detect_version(&data);
    if version < MAX_SPEC_VERSION {
        return Err(FormatError::LegacyVersion(version).into());
    }

    let header = Arc::new(Header::from_bytes(&data, resp.etag)?);

    let root_start = header.root_directory_offset;
    let root_end = root_start.saturating_add(header.root_directory_length);
    let root = if prefetch && header.root_directory_length > 0 && root_end <= data.len() as u64 {
        let raw = data.slice(root_start as usize..root_end as usize);
        let decompressed = decompressor.decompress(raw, header.internal_compression)?;
        let directory = Arc::new(Directory::from_bytes(&decompressed)?);
        debug!(
            source = %source.key(),
            entries = directory.len(),
            "Prefetched root directory"
        );
        let key = range_key(
            source.key(),
            header.etag.as_deref(),
            root_start,
            header.root_directory_length,
        );
        Some((key, directory))
    } else {
        None
    };

    Ok(HeaderFetch { header, root })
}

/// Fetch, decompress and decode a directory.
pub(crate) async fn fetch_directory(
    source: &dyn Source,
    offset: u64,
    length: u64,
    header: &Header,
    decompressor: &dyn Decompress,
) -> Result<Arc<Directory>, TileError> {
    debug!(source = %source.key(), offset, length, "Fetching directory");
    let resp = source
        .get_bytes(offset, length, None, header.etag.as_deref())
        .await?;
    let data = decompressor.decompress(resp.data, header.internal_compression)?;
    Ok(Arc::new(Directory::from_bytes(&data)?))
}

/// Fetch a raw byte range.
pub(crate) async fn fetch_bytes(
    source: &dyn Source,
    offset: u64,
    length: u64,
    header: &Header,
) -> Result<Bytes, TileError> {
    debug!(source = %source.key(), offset, length, "Fetching byte range");
    let resp = source
        .get_bytes(offset, length, None, header.etag.as_deref())
        .await?;
    Ok(resp.data)
}
