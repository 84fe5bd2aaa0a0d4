//! Directory decoding and tile lookup.
//!
//! A directory is serialized as a varint entry count followed by four
//! column-wise passes over the entries:
//!
//! 1. tile ids, delta-encoded against the previous entry
//! 2. run lengths
//! 3. lengths
//! 4. offsets, where `0` (for any entry but the first) means "directly after
//!    the previous entry" and any other value `v` means absolute offset `v - 1`

use super::varint::VarintReader;
use crate::error::FormatError;

/// A single directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// First tile id covered by this entry
    pub tile_id: u64,

    /// Byte offset, relative to the tile data section (tile entries) or the
    /// leaf directory section (leaf pointers)
    pub offset: u64,

    /// Length of the tile or leaf directory in bytes
    pub length: u32,

    /// Number of consecutive tile ids sharing this byte range; 0 marks a leaf
    /// directory pointer
    pub run_length: u32,
}

impl Entry {
    /// Whether this entry points at a leaf directory rather than tile data.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.run_length == 0
    }
}

/// A decoded, non-empty directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<Entry>,
}

impl Directory {
    /// Decode a directory from its (already decompressed) bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::MalformedDirectory`] if the stream ends early,
    /// a value overflows its field, or the directory has no entries.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        let mut reader = VarintReader::new(data);
        let num_entries = reader.read_varint()?;

        if num_entries == 0 {
            return Err(FormatError::MalformedDirectory(
                "empty directory is invalid".to_string(),
            ));
        }

        // Each entry needs at least four bytes, which bounds the allocation
        // for hostile counts.
        if num_entries.saturating_mul(4) > data.len() as u64 {
            return Err(FormatError::MalformedDirectory(format!(
                "entry count {} exceeds directory size {}",
                num_entries,
                data.len()
            )));
        }
        let n = num_entries as usize;

        let mut entries = Vec::with_capacity(n);
        let mut last_id = 0u64;
        for _ in 0..n {
            let delta = reader.read_varint()?;
            last_id = last_id.checked_add(delta).ok_or_else(|| {
                FormatError::MalformedDirectory("tile id overflow".to_string())
            })?;
            entries.push(Entry {
                tile_id: last_id,
                offset: 0,
                length: 0,
                run_length: 1,
            });
        }

        for entry in entries.iter_mut() {
            entry.run_length = read_u32(&mut reader, "run length")?;
        }

        for entry in entries.iter_mut() {
            entry.length = read_u32(&mut reader, "length")?;
        }

        for i in 0..n {
            let value = reader.read_varint()?;
            entries[i].offset = if value == 0 && i > 0 {
                let prev = &entries[i - 1];
                prev.offset
                    .checked_add(u64::from(prev.length))
                    .ok_or_else(|| {
                        FormatError::MalformedDirectory("offset overflow".to_string())
                    })?
            } else if value == 0 {
                return Err(FormatError::MalformedDirectory(
                    "first entry has no absolute offset".to_string(),
                ));
            } else {
                value - 1
            };
        }

        Ok(Self { entries })
    }

    /// All entries, sorted by tile id.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries (always at least one).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry covering `tile_id`.
    pub fn find_tile(&self, tile_id: u64) -> Option<&Entry> {
        find_tile(&self.entries, tile_id)
    }
}

fn read_u32(reader: &mut VarintReader<'_>, field: &str) -> Result<u32, FormatError> {
    let value = reader.read_varint()?;
    u32::try_from(value).map_err(|_| {
        FormatError::MalformedDirectory(format!("{} {} does not fit in 32 bits", field, value))
    })
}

/// Find the entry covering `tile_id` in a sorted entry list.
///
/// An exact id match is returned as-is (tile or leaf pointer). Otherwise the
/// closest preceding entry matches if it is a leaf pointer, or if its run
/// covers `tile_id`.
pub fn find_tile(entries: &[Entry], tile_id: u64) -> Option<&Entry> {
    match entries.binary_search_by_key(&tile_id, |e| e.tile_id) {
        Ok(idx) => Some(&entries[idx]),
        Err(0) => None,
        Err(idx) => {
            let candidate = &entries[idx - 1];
            if candidate.is_leaf() || tile_id - candidate.tile_id < u64::from(candidate.run_length)
            {
                Some(candidate)
            } else {
                None
            }
        }
    }
}
