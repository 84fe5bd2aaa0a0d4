//! In-memory archives and sources for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::IoError;
use crate::format::{zxy_to_tile_id, HEADER_SIZE_BYTES};
use crate::io::{RangeResponse, Source};

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Builds an uncompressed archive with a single root directory.
pub(crate) struct ArchiveBuilder {
    tiles: Vec<(u64, Vec<u8>)>,
    /// `(tile_id, offset, length, run_length)` rows written verbatim as the root
    raw_root: Vec<(u64, u64, u64, u64)>,
    leaf_directory_offset: Option<u64>,
    metadata: Vec<u8>,
    min_zoom: u8,
    max_zoom: u8,
    spec_version: u8,
}

impl ArchiveBuilder {
    pub(crate) fn new() -> Self {
        Self {
            tiles: Vec::new(),
            raw_root: Vec::new(),
            leaf_directory_offset: None,
            metadata: b"{}".to_vec(),
            min_zoom: 0,
            max_zoom: 14,
            spec_version: 3,
        }
    }

    pub(crate) fn tile(mut self, z: u8, x: u32, y: u32, data: &[u8]) -> Self {
        let id = zxy_to_tile_id(z, x, y).unwrap();
        self.tiles.push((id, data.to_vec()));
        self
    }

    pub(crate) fn zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub(crate) fn metadata(mut self, json: &str) -> Self {
        self.metadata = json.as_bytes().to_vec();
        self
    }

    /// Write a root entry as given, bypassing the tile layout.
    pub(crate) fn raw_entry(mut self, tile_id: u64, offset: u64, length: u64, run_length: u64) -> Self {
        self.raw_root.push((tile_id, offset, length, run_length));
        self
    }

    pub(crate) fn leaf_directory_offset(mut self, offset: u64) -> Self {
        self.leaf_directory_offset = Some(offset);
        self
    }

    pub(crate) fn spec_version(mut self, version: u8) -> Self {
        self.spec_version = version;
        self
    }

    pub(crate) fn build(mut self) -> Vec<u8> {
        self.tiles.sort_by_key(|(id, _)| *id);

        let mut tile_data = Vec::new();
        let mut entries = Vec::new();
        for (id, data) in &self.tiles {
            entries.push((*id, tile_data.len() as u64, data.len() as u64, 1));
            tile_data.extend_from_slice(data);
        }
        if !self.raw_root.is_empty() {
            entries = self.raw_root.clone();
        }

        let mut root = Vec::new();
        write_varint(&mut root, entries.len() as u64);
        let mut last_id = 0;
        for (id, _, _, _) in &entries {
            write_varint(&mut root, id - last_id);
            last_id = *id;
        }
        for (_, _, _, run_length) in &entries {
            write_varint(&mut root, *run_length);
        }
        for (_, _, length, _) in &entries {
            write_varint(&mut root, *length);
        }
        for (i, (_, offset, _, _)) in entries.iter().enumerate() {
            let contiguous = i > 0 && {
                let (_, prev_offset, prev_length, _) = entries[i - 1];
                *offset == prev_offset + prev_length
            };
            write_varint(&mut root, if contiguous { 0 } else { offset + 1 });
        }

        let root_offset = HEADER_SIZE_BYTES as u64;
        let metadata_offset = root_offset + root.len() as u64;
        let tile_offset = metadata_offset + self.metadata.len() as u64;
        let leaf_offset = self.leaf_directory_offset.unwrap_or(tile_offset);

        let mut header = vec![0u8; HEADER_SIZE_BYTES];
        header[0..7].copy_from_slice(b"PMTiles");
        header[7] = self.spec_version;
        let u64_fields = [
            root_offset,
            root.len() as u64,
            metadata_offset,
            self.metadata.len() as u64,
            leaf_offset,
            0,
            tile_offset,
            tile_data.len() as u64,
            entries.len() as u64,
            entries.len() as u64,
            entries.len() as u64,
        ];
        for (i, value) in u64_fields.iter().enumerate() {
            let at = 8 + i * 8;
            header[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }
        header[96] = 1;
        header[97] = 1;
        header[98] = 1;
        header[99] = 1;
        header[100] = self.min_zoom;
        header[101] = self.max_zoom;

        let mut archive = header;
        archive.extend_from_slice(&root);
        archive.extend_from_slice(&self.metadata);
        archive.extend_from_slice(&tile_data);
        archive
    }
}

/// Source serving a byte buffer, counting fetches.
pub(crate) struct MemorySource {
    key: String,
    data: Bytes,
    etag: Mutex<Option<String>>,
    fetches: AtomicUsize,
    delay: Option<Duration>,
}

impl MemorySource {
    pub(crate) fn new(key: &str, data: Vec<u8>) -> Self {
        Self {
            key: key.to_string(),
            data: Bytes::from(data),
            etag: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub(crate) fn with_etag(self, etag: &str) -> Self {
        *self.etag.lock().unwrap() = Some(etag.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn set_etag(&self, etag: &str) {
        *self.etag.lock().unwrap() = Some(etag.to_string());
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn get_bytes(
        &self,
        offset: u64,
        length: u64,
        _cancel: Option<&CancellationToken>,
        etag: Option<&str>,
    ) -> Result<RangeResponse, IoError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let current = self.etag.lock().unwrap().clone();
        if let (Some(expected), Some(actual)) = (etag, current.as_deref()) {
            if expected != actual {
                return Err(IoError::EtagMismatch {
                    expected: Some(expected.to_string()),
                    actual: Some(actual.to_string()),
                });
            }
        }

        let start = (offset as usize).min(self.data.len());
        let end = (offset.saturating_add(length) as usize).min(self.data.len());
        Ok(RangeResponse::new(self.data.slice(start..end)).with_etag(current))
    }

    fn key(&self) -> &str {
        &self.key
    }
}
