//! Tile and metadata lookups against a single archive.
//!
//! [`PmTiles`] ties a [`Source`] to a shared [`ArchiveCache`]:
//!
//! ```text
//! get_zxy(z, x, y)
//!   1. tile id          (rejects bad coordinates before any I/O)
//!   2. header           (cached)
//!   3. zoom bounds      (OutOfZoom without touching directories)
//!   4. root -> leaves   (cached, at most 4 levels)
//!   5. tile bytes       (uncached, decompressed)
//! ```
//!
//! If the archive changes underneath a request, the source reports an ETag
//! mismatch; the reader invalidates the cached header and retries once.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::ArchiveCache;
use crate::error::{FormatError, TileError};
use crate::format::{zxy_to_tile_id, Header, MAX_SPEC_VERSION};
use crate::io::{Decompress, DefaultDecompressor, Source};

/// Maximum number of directories visited for one lookup (root plus leaves).
pub const MAX_DIRECTORY_DEPTH: usize = 4;

/// Decompressed tile bytes with the caching hints of the response.
#[derive(Debug, Clone, PartialEq)]
pub struct TileData {
    pub data: Bytes,
    pub cache_control: Option<String>,
    pub expires: Option<String>,
}

/// Outcome of a tile lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum TileLookup {
    /// The archive holds this tile
    Tile(TileData),

    /// The zoom level lies outside the archive's zoom range
    OutOfZoom,

    /// The zoom level is covered but no entry matches the tile
    Empty,
}

/// Reader for one archive.
///
/// Cheap to construct; the expensive state lives in the shared cache.
pub struct PmTiles {
    source: Arc<dyn Source>,
    cache: Arc<dyn ArchiveCache>,
    decompressor: Arc<dyn Decompress>,
}

impl PmTiles {
    pub fn new(source: Arc<dyn Source>, cache: Arc<dyn ArchiveCache>) -> Self {
        Self {
            source,
            cache,
            decompressor: Arc::new(DefaultDecompressor),
        }
    }

    /// Use `decompressor` for tiles and metadata.
    pub fn with_decompressor(mut self, decompressor: Arc<dyn Decompress>) -> Self {
        self.decompressor = decompressor;
        self
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    /// Resolve the archive header.
    pub async fn get_header(&self) -> Result<Arc<Header>, TileError> {
        self.cache.get_header(&self.source).await
    }

    /// Look up the tile at `(z, x, y)`.
    ///
    /// Cancelling `cancel` aborts the tile fetch with
    /// [`crate::IoError::Cancelled`].
    pub async fn get_zxy(
        &self,
        z: u8,
        x: u32,
        y: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<TileLookup, TileError> {
        let tile_id = zxy_to_tile_id(z, x, y)?;
        self.retry_on_mismatch(move || self.lookup_tile(tile_id, z, cancel))
            .await
    }

    /// Read and parse the archive's JSON metadata.
    pub async fn get_metadata(&self) -> Result<serde_json::Value, TileError> {
        self.retry_on_mismatch(move || self.read_metadata()).await
    }

    async fn retry_on_mismatch<T, F, Fut>(&self, mut attempt: F) -> Result<T, TileError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TileError>>,
    {
        match attempt().await {
            Err(e) if e.is_etag_mismatch() => {
                warn!(
                    source = %self.source.key(),
                    error = %e,
                    "Archive changed, refreshing header and retrying"
                );
                self.cache.invalidate(&self.source).await?;
                attempt().await
            }
            result => result,
        }
    }

    async fn current_header(&self) -> Result<Arc<Header>, TileError> {
        let header = self.cache.get_header(&self.source).await?;
        if header.spec_version < MAX_SPEC_VERSION {
            return Err(FormatError::LegacyVersion(header.spec_version).into());
        }
        Ok(header)
    }

    async fn lookup_tile(
        &self,
        tile_id: u64,
        z: u8,
        cancel: Option<&CancellationToken>,
    ) -> Result<TileLookup, TileError> {
        let header = self.current_header().await?;

        if !header.contains_zoom(z) {
            debug!(
                z,
                min_zoom = header.min_zoom,
                max_zoom = header.max_zoom,
                "Zoom outside archive range"
            );
            return Ok(TileLookup::OutOfZoom);
        }

        let mut offset = header.root_directory_offset;
        let mut length = header.root_directory_length;

        for depth in 0..MAX_DIRECTORY_DEPTH {
            let directory = self
                .cache
                .get_directory(&self.source, offset, length, &header)
                .await?;

            let Some(entry) = directory.find_tile(tile_id) else {
                debug!(tile_id, depth, "No directory entry for tile");
                return Ok(TileLookup::Empty);
            };

            if entry.is_leaf() {
                offset = section_offset(header.leaf_directory_offset, entry.offset, "leaf")?;
                length = u64::from(entry.length);
                continue;
            }

            let tile_offset = section_offset(header.tile_data_offset, entry.offset, "tile")?;
            let resp = self
                .source
                .get_bytes(
                    tile_offset,
                    u64::from(entry.length),
                    cancel,
                    header.etag.as_deref(),
                )
                .await?;

            let data = self
                .decompressor
                .decompress(resp.data, header.tile_compression)?;

            return Ok(TileLookup::Tile(TileData {
                data,
                cache_control: resp.cache_control,
                expires: resp.expires,
            }));
        }

        Err(TileError::DirectoryDepthExceeded)
    }

    async fn read_metadata(&self) -> Result<serde_json::Value, TileError> {
        let header = self.current_header().await?;

        let resp = self
            .source
            .get_bytes(
                header.json_metadata_offset,
                header.json_metadata_length,
                None,
                header.etag.as_deref(),
            )
            .await?;

        let data = self
            .decompressor
            .decompress(resp.data, header.internal_compression)?;

        serde_json::from_slice(&data)
            .map_err(|e| FormatError::InvalidMetadata(e.to_string()).into())
    }
}

/// Absolute position of an entry relative to the start of its section.
fn section_offset(base: u64, relative: u64, kind: &str) -> Result<u64, FormatError> {
    base.checked_add(relative).ok_or_else(|| {
        FormatError::MalformedDirectory(format!(
            "{} offset {} overflows section start {}",
            kind, relative, base
        ))
    })
}
