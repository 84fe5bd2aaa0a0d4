use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt, Shared};
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

type SharedFetch = Shared<BoxFuture<'static, Result<CachedValue, TileError>>>;

/// Single-flight cache of headers, directories and byte ranges.
///
/// Each entry is a shared future. A request arriving while a fetch for the
/// same key is still running awaits that fetch instead of starting another.
/// Fetches that fail are dropped from the cache so the next request retries.
pub struct SharedPromiseCache {
    entries: Arc<Mutex<LruCache<String, SharedFetch>>>,
    prefetch: bool,
    decompressor: Arc<dyn Decompress>,
}

impl SharedPromiseCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    ///
    /// With `prefetch`, a root directory that fits inside the initial header
    /// read is decoded and cached alongside the header.
    pub fn new(capacity: usize, prefetch: bool, decompressor: Arc<dyn Decompress>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(new_lru(capacity))),
            prefetch,
            decompressor,
        }
    }

    /// Number of cached entries, including fetches still in flight.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn capacity(&self) -> usize {
        self.entries.lock().await.cap().get()
    }

    /// Await the entry for `key`, starting `fetch` if there is none.
    async fn get_or_fetch<F>(&self, key: &str, fetch: F) -> Result<CachedValue, TileError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<CachedValue, TileError>>,
    {
        let pending = {
            let mut entries = self.entries.lock().await;
            match entries.get(key).cloned() {
                Some(pending) => {
                    debug!(key, "Cache hit");
                    pending
                }
                None => {
                    debug!(key, "Cache miss");
                    let pending = fetch().shared();
                    entries.put(key.to_string(), pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;
        if result.is_err() {
            let mut entries = self.entries.lock().await;
            if entries
                .peek(key)
                .is_some_and(|current| current.ptr_eq(&pending))
            {
                entries.pop(key);
            }
        }
        result
    }
}

impl Default for SharedPromiseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, true, Arc::new(DefaultDecompressor))
    }
}

#[async_trait]
impl ArchiveCache for SharedPromiseCache {
    async fn get_header(&self, source: &Arc<dyn Source>) -> Result<Arc<Header>, TileError> {
        let key = source.key().to_string();
        let source = source.clone();
        let entries = self.entries.clone();
        let decompressor = self.decompressor.clone();
        let prefetch = self.prefetch;

        self.get_or_fetch(&key, move || {
            async move {
                let fetched =
                    fetch_header(source.as_ref(), prefetch, decompressor.as_ref()).await?;
                if let Some((root_key, root)) = fetched.root {
                    let ready: SharedFetch = future::ready(Ok(CachedValue::Directory(root)))
                        .boxed()
                        .shared();
                    entries.lock().await.put(root_key, ready);
                }
                Ok(CachedValue::Header(fetched.header))
            }
            .boxed()
        })
        .await?
        .into_header(&key)
    }

    async fn get_directory(
        &self,
        source: &Arc<dyn Source>,
        offset: u64,
        length: u64,
        header: &Header,
    ) -> Result<Arc<Directory>, TileError> {
        let key = range_key(source.key(), header.etag.as_deref(), offset, length);
        let source = source.clone();
        let header = header.clone();
        let decompressor = self.decompressor.clone();

        self.get_or_fetch(&key, move || {
            async move {
                let directory = fetch_directory(
                    source.as_ref(),
                    offset,
                    length,
                    &header,
                    decompressor.as_ref(),
                )
                .await?;
                Ok(CachedValue::Directory(directory))
            }
            .boxed()
        })
        .await?
        .into_directory(&key)
    }

    async fn get_bytes(
        &self,
        source: &Arc<dyn Source>,
        offset: u64,
        length: u64,
        header: &Header,
    ) -> Result<Bytes, TileError> {
        let key = range_key(source.key(), header.etag.as_deref(), offset, length);
        let source = source.clone();
        let header = header.clone();

        self.get_or_fetch(&key, move || {
            async move {
                let data = fetch_bytes(source.as_ref(), offset, length, &header).await?;
                Ok(CachedValue::Bytes(data))
            }
            .boxed()
        })
        .await?
        .into_bytes(&key)
    }

    async fn invalidate(&self, source: &Arc<dyn Source>) -> Result<(), TileError> {
        self.entries.lock().await.pop(source.key());
        self.get_header(source).await?;
        Ok(())
    }
}
