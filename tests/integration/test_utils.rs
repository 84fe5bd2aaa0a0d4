//! Test utilities for integration tests.
//!
//! This module provides an in-memory archive writer, a source that records
//! every range request, and a provider that serves named test archives.

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use pmtiles_streamer::archive::ArchiveProvider;
use pmtiles_streamer::error::IoError;
use pmtiles_streamer::format::HEADER_SIZE_BYTES;
use pmtiles_streamer::io::{RangeResponse, Source};
use pmtiles_streamer::{zxy_to_tile_id, Compression, TileType};

// =============================================================================
// Archive Writer
// =============================================================================

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn compression_byte(compression: Compression) -> u8 {
    match compression {
        Compression::Unknown => 0,
        Compression::None => 1,
        Compression::Gzip => 2,
        Compression::Brotli => 3,
        Compression::Zstd => 4,
    }
}

fn tile_type_byte(tile_type: TileType) -> u8 {
    match tile_type {
        TileType::Unknown => 0,
        TileType::Mvt => 1,
        TileType::Png => 2,
        TileType::Jpeg => 3,
        TileType::Webp => 4,
        TileType::Avif => 5,
    }
}

/// Gzip `data` with default settings.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn compress(data: Vec<u8>, compression: Compression) -> Vec<u8> {
    match compression {
        Compression::Gzip => gzip(&data),
        Compression::Zstd => zstd::stream::encode_all(data.as_slice(), 0).unwrap(),
        _ => data,
    }
}

/// `(tile_id, offset, length, run_length)` rows serialized column-wise.
fn encode_directory(entries: &[(u64, u64, u64, u64)]) -> Vec<u8> {
    let mut out = Vec::new();
    write_varint(&mut out, entries.len() as u64);

    let mut last_id = 0;
    for (id, _, _, _) in entries {
        write_varint(&mut out, id - last_id);
        last_id = *id;
    }
    for (_, _, _, run_length) in entries {
        write_varint(&mut out, *run_length);
    }
    for (_, _, length, _) in entries {
        write_varint(&mut out, *length);
    }
    for (i, (_, offset, _, _)) in entries.iter().enumerate() {
        let contiguous = i > 0 && {
            let (_, prev_offset, prev_length, _) = entries[i - 1];
            *offset == prev_offset + prev_length
        };
        write_varint(&mut out, if contiguous { 0 } else { offset + 1 });
    }
    out
}

/// Writes spec version 3 archives for tests.
///
/// Tiles are stored in tile id order. With [`TestArchive::leaf_size`] the
/// root directory only holds pointers to leaf directories of that many
/// entries each.
pub struct TestArchive {
    tiles: Vec<(u64, u64, Vec<u8>)>,
    metadata: String,
    tile_type: TileType,
    internal_compression: Compression,
    tile_compression: Compression,
    min_zoom: u8,
    max_zoom: u8,
    leaf_size: Option<usize>,
    root_padding: usize,
}

impl Default for TestArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl TestArchive {
    pub fn new() -> Self {
        Self {
            tiles: Vec::new(),
            metadata: r#"{"name":"test"}"#.to_string(),
            tile_type: TileType::Mvt,
            internal_compression: Compression::None,
            tile_compression: Compression::None,
            min_zoom: 0,
            max_zoom: 14,
            leaf_size: None,
            root_padding: 0,
        }
    }

    /// Add a tile; `data` is stored as given (already compressed if needed).
    pub fn tile(self, z: u8, x: u32, y: u32, data: &[u8]) -> Self {
        self.tile_run(z, x, y, 1, data)
    }

    /// Add an entry covering `run_length` consecutive tile ids.
    pub fn tile_run(mut self, z: u8, x: u32, y: u32, run_length: u64, data: &[u8]) -> Self {
        let id = zxy_to_tile_id(z, x, y).unwrap();
        self.tiles.push((id, run_length, data.to_vec()));
        self
    }

    pub fn metadata(mut self, json: &str) -> Self {
        self.metadata = json.to_string();
        self
    }

    pub fn tile_type(mut self, tile_type: TileType) -> Self {
        self.tile_type = tile_type;
        self
    }

    pub fn internal_compression(mut self, compression: Compression) -> Self {
        self.internal_compression = compression;
        self
    }

    pub fn tile_compression(mut self, compression: Compression) -> Self {
        self.tile_compression = compression;
        self
    }

    pub fn zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn leaf_size(mut self, entries: usize) -> Self {
        self.leaf_size = Some(entries.max(1));
        self
    }

    /// Pad the space between header and root directory so the root lies
    /// outside the initial header read.
    pub fn root_padding(mut self, bytes: usize) -> Self {
        self.root_padding = bytes;
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.tiles.sort_by_key(|(id, _, _)| *id);

        let mut tile_data = Vec::new();
        let mut entries = Vec::new();
        for (id, run_length, data) in &self.tiles {
            entries.push((*id, tile_data.len() as u64, data.len() as u64, *run_length));
            tile_data.extend_from_slice(data);
        }

        let mut leaves = Vec::new();
        let root_entries = match self.leaf_size {
            None => entries,
            Some(size) => {
                let mut pointers = Vec::new();
                for chunk in entries.chunks(size) {
                    let leaf = compress(encode_directory(chunk), self.internal_compression);
                    pointers.push((chunk[0].0, leaves.len() as u64, leaf.len() as u64, 0));
                    leaves.extend_from_slice(&leaf);
                }
                pointers
            }
        };
        let root = compress(encode_directory(&root_entries), self.internal_compression);
        let metadata = compress(self.metadata.into_bytes(), self.internal_compression);

        let root_offset = (HEADER_SIZE_BYTES + self.root_padding) as u64;
        let metadata_offset = root_offset + root.len() as u64;
        let leaf_offset = metadata_offset + metadata.len() as u64;
        let tile_offset = leaf_offset + leaves.len() as u64;

        let mut header = vec![0u8; HEADER_SIZE_BYTES];
        header[0..7].copy_from_slice(b"PMTiles");
        header[7] = 3;
        let u64_fields = [
            root_offset,
            root.len() as u64,
            metadata_offset,
            metadata.len() as u64,
            leaf_offset,
            leaves.len() as u64,
            tile_offset,
            tile_data.len() as u64,
            self.tiles.len() as u64,
            self.tiles.len() as u64,
            self.tiles.len() as u64,
        ];
        for (i, value) in u64_fields.iter().enumerate() {
            let at = 8 + i * 8;
            header[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }
        header[96] = 1;
        header[97] = compression_byte(self.internal_compression);
        header[98] = compression_byte(self.tile_compression);
        header[99] = tile_type_byte(self.tile_type);
        header[100] = self.min_zoom;
        header[101] = self.max_zoom;

        let coords: [(usize, i32); 6] = [
            (102, -1_800_000_000),
            (106, -850_000_000),
            (110, 1_800_000_000),
            (114, 850_000_000),
            (119, 0),
            (123, 0),
        ];
        for (at, value) in coords {
            header[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        header[118] = self.min_zoom;

        let mut archive = header;
        archive.resize(root_offset as usize, 0);
        archive.extend_from_slice(&root);
        archive.extend_from_slice(&metadata);
        archive.extend_from_slice(&leaves);
        archive.extend_from_slice(&tile_data);
        archive
    }
}

// =============================================================================
// Tracking Source
// =============================================================================

/// In-memory source that records each range request.
///
/// The content and ETag can be swapped to simulate the archive being
/// replaced underneath a running server.
pub struct TrackingSource {
    key: String,
    state: Mutex<(Bytes, Option<String>)>,
    request_count: AtomicUsize,
    requests: Mutex<Vec<(u64, u64)>>,
    delay: Option<Duration>,
}

impl TrackingSource {
    pub fn new(key: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            state: Mutex::new((Bytes::from(data), None)),
            request_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_etag(self, etag: &str) -> Self {
        self.state.lock().unwrap().1 = Some(etag.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the archive content and its ETag.
    pub fn replace(&self, data: Vec<u8>, etag: &str) {
        *self.state.lock().unwrap() = (Bytes::from(data), Some(etag.to_string()));
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(u64, u64)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reset_tracking(&self) {
        self.request_count.store(0, Ordering::SeqCst);
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl Source for TrackingSource {
    async fn get_bytes(
        &self,
        offset: u64,
        length: u64,
        cancel: Option<&CancellationToken>,
        etag: Option<&str>,
    ) -> Result<RangeResponse, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((offset, length));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(IoError::Cancelled);
        }

        let (data, current) = self.state.lock().unwrap().clone();
        if let (Some(expected), Some(actual)) = (etag, current.as_deref()) {
            if expected != actual {
                return Err(IoError::EtagMismatch {
                    expected: Some(expected.to_string()),
                    actual: Some(actual.to_string()),
                });
            }
        }

        let start = (offset as usize).min(data.len());
        let end = (offset.saturating_add(length) as usize).min(data.len());
        Ok(RangeResponse::new(data.slice(start..end)).with_etag(current))
    }

    fn key(&self) -> &str {
        &self.key
    }
}

// =============================================================================
// Mock Provider
// =============================================================================

/// Provider serving a fixed set of named archives.
#[derive(Default)]
pub struct MockProvider {
    archives: HashMap<String, Arc<TrackingSource>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(mut self, name: &str, data: Vec<u8>) -> Self {
        let source = Arc::new(TrackingSource::new(name, data));
        self.archives.insert(name.to_string(), source);
        self
    }
}

impl ArchiveProvider for MockProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn Source>, IoError> {
        match self.archives.get(name) {
            Some(source) => {
                let source: Arc<dyn Source> = source.clone();
                Ok(source)
            }
            None => Err(IoError::NotFound(name.to_string())),
        }
    }
}
