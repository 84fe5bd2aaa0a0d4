use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    fetch_bytes, fetch_directory, fetch_header, new_lru, range_key, ArchiveCache, CachedValue,
    DEFAULT_CACHE_CAPACITY,
};
use crate::error::TileError;
use crate::format::{Directory, Header};
use crate::io::{Decompress, DefaultDecompressor, Source};

/// Cache of resolved headers, directories and byte ranges.
///
/// Concurrent misses for the same key are not coalesced: each caller fetches
/// and the last insert wins. Use [`super::SharedPromiseCache`] when many
/// requests hit the same cold archive at once.
pub struct ResolvedValueCache {
    entries: Mutex<LruCache<String, CachedValue>>,
    prefetch: bool,
    decompressor: Arc<dyn Decompress>,
}

impl ResolvedValueCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    ///
    /// With `prefetch`, a root directory that fits inside the initial header
    /// read is decoded and cached alongside the header.
    pub fn new(capacity: usize, prefetch: bool, decompressor: Arc<dyn Decompress>) -> Self {
        Self {
            entries: Mutex::new(new_lru(capacity)),
            prefetch,
            decompressor,
        }
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn capacity(&self) -> usize {
        self.entries.lock().await.cap().get()
    }

    async fn lookup(&self, key: &str) -> Option<CachedValue> {
        let hit = self.entries.lock().await.get(key).cloned();
        debug!(key, hit = hit.is_some(), "Cache lookup");
        hit
    }
}

impl Default for ResolvedValueCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, true, Arc::new(DefaultDecompressor))
    }
}

#[async_trait]
impl ArchiveCache for ResolvedValueCache {
    async fn get_header(&self, source: &Arc<dyn Source>) -> Result<Arc<Header>, TileError> {
        let key = source.key().to_string();
        if let Some(value) = self.lookup(&key).await {
            return value.into_header(&key);
        }

        let fetched = fetch_header(source.as_ref(), self.prefetch, self.decompressor.as_ref()).await?;

        let mut entries = self.entries.lock().await;
        if let Some((root_key, root)) = fetched.root {
            entries.put(root_key, CachedValue::Directory(root));
        }
        entries.put(key, CachedValue::Header(fetched.header.clone()));
        Ok(fetched.header)
    }

    async fn get_directory(
        &self,
        source: &Arc<dyn Source>,
        offset: u64,
        length: u64,
        header: &Header,
    ) -> Result<Arc<Directory>, TileError> {
        let key = range_key(source.key(), header.etag.as_deref(), offset, length);
        if let Some(value) = self.lookup(&key).await {
            return value.into_directory(&key);
        }

        let directory = fetch_directory(
            source.as_ref(),
            offset,
            length,
            header,
            self.decompressor.as_ref(),
        )
        .await?;

        self.entries
            .lock()
            .await
            .put(key, CachedValue::Directory(directory.clone()));
        Ok(directory)
    }

    async fn get_bytes(
        &self,
        source: &Arc<dyn Source>,
        offset: u64,
        length: u64,
        header: &Header,
    ) -> Result<Bytes, TileError> {
        let key = range_key(source.key(), header.etag.as_deref(), offset, length);
        if let Some(value) = self.lookup(&key).await {
            return value.into_bytes(&key);
        }

        let data = fetch_bytes(source.as_ref(), offset, length, header).await?;

        self.entries
            .lock()
            .await
            .put(key, CachedValue::Bytes(data.clone()));
        Ok(data)
    }

    async fn invalidate(&self, source: &Arc<dyn Source>) -> Result<(), TileError> {
        self.entries.lock().await.pop(source.key());
        self.get_header(source).await?;
        Ok(())
    }
}
