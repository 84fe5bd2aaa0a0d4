//! Archive header codec.
//!
//! The header occupies the first 127 bytes of a spec version 3 archive. All
//! integers are little-endian; coordinates are stored as `i32` fixed-point
//! values scaled by 10^7.

use tracing::warn;

use crate::error::FormatError;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE_BYTES: usize = 127;

/// First two magic bytes ("PM") read as a little-endian u16.
pub const MAGIC: u16 = 0x4D50;

/// Highest spec version this library decodes.
pub const MAX_SPEC_VERSION: u8 = 3;

const COORD_SCALE: f64 = 10_000_000.0;

// =============================================================================
// Enumerations
// =============================================================================

/// Compression applied to directories, metadata or tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Unknown,
    None,
    Gzip,
    Brotli,
    Zstd,
}

impl Compression {
    /// Decode a compression byte; unrecognized values become `Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Compression::None,
            2 => Compression::Gzip,
            3 => Compression::Brotli,
            4 => Compression::Zstd,
            _ => Compression::Unknown,
        }
    }
}

/// Content type of the tiles in an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileType {
    Unknown,
    Mvt,
    Png,
    Jpeg,
    Webp,
    Avif,
}

impl TileType {
    /// Decode a tile type byte; unrecognized values become `Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => TileType::Mvt,
            2 => TileType::Png,
            3 => TileType::Jpeg,
            4 => TileType::Webp,
            5 => TileType::Avif,
            _ => TileType::Unknown,
        }
    }

    /// HTTP content type for tiles of this type.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            TileType::Mvt => Some("application/x-protobuf"),
            TileType::Png => Some("image/png"),
            TileType::Jpeg => Some("image/jpeg"),
            TileType::Webp => Some("image/webp"),
            TileType::Avif => Some("image/avif"),
            TileType::Unknown => None,
        }
    }

    /// Canonical file extension (without the dot).
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            TileType::Mvt => Some("mvt"),
            TileType::Png => Some("png"),
            TileType::Jpeg => Some("jpg"),
            TileType::Webp => Some("webp"),
            TileType::Avif => Some("avif"),
            TileType::Unknown => None,
        }
    }
}

// =============================================================================
// Header
// =============================================================================

/// Decoded archive header.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub spec_version: u8,
    pub root_directory_offset: u64,
    pub root_directory_length: u64,
    pub json_metadata_offset: u64,
    pub json_metadata_length: u64,
    pub leaf_directory_offset: u64,
    pub leaf_directory_length: u64,
    pub tile_data_offset: u64,
    pub tile_data_length: u64,
    pub num_addressed_tiles: u64,
    pub num_tile_entries: u64,
    pub num_tile_contents: u64,
    pub clustered: bool,
    pub internal_compression: Compression,
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
    pub center_zoom: u8,
    pub center_lon: f64,
    pub center_lat: f64,

    /// Strong validator of the response the header was read from
    pub etag: Option<String>,
}

impl Header {
    /// Decode a header from the start of an archive.
    ///
    /// `bytes` may be longer than the header; only the first 127 bytes are
    /// read.
    ///
    /// # Errors
    ///
    /// Fails if the buffer is too short, the magic number is wrong, or the
    /// spec version is newer than 3.
    pub fn from_bytes(bytes: &[u8], etag: Option<String>) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE_BYTES {
            return Err(FormatError::HeaderTooShort {
                required: HEADER_SIZE_BYTES,
                actual: bytes.len(),
            });
        }

        check_magic(bytes)?;

        let spec_version = bytes[7];
        if spec_version > MAX_SPEC_VERSION {
            return Err(FormatError::UnsupportedVersion(spec_version));
        }

        Ok(Self {
            spec_version,
            root_directory_offset: read_u64_le(bytes, 8),
            root_directory_length: read_u64_le(bytes, 16),
            json_metadata_offset: read_u64_le(bytes, 24),
            json_metadata_length: read_u64_le(bytes, 32),
            leaf_directory_offset: read_u64_le(bytes, 40),
            leaf_directory_length: read_u64_le(bytes, 48),
            tile_data_offset: read_u64_le(bytes, 56),
            tile_data_length: read_u64_le(bytes, 64),
            num_addressed_tiles: read_u64_le(bytes, 72),
            num_tile_entries: read_u64_le(bytes, 80),
            num_tile_contents: read_u64_le(bytes, 88),
            clustered: bytes[96] == 1,
            internal_compression: Compression::from_u8(bytes[97]),
            tile_compression: Compression::from_u8(bytes[98]),
            tile_type: TileType::from_u8(bytes[99]),
            min_zoom: bytes[100],
            max_zoom: bytes[101],
            min_lon: read_coord(bytes, 102),
            min_lat: read_coord(bytes, 106),
            max_lon: read_coord(bytes, 110),
            max_lat: read_coord(bytes, 114),
            center_zoom: bytes[118],
            center_lon: read_coord(bytes, 119),
            center_lat: read_coord(bytes, 123),
            etag,
        })
    }

    /// Whether `z` lies within the archive's zoom range.
    pub fn contains_zoom(&self, z: u8) -> bool {
        z >= self.min_zoom && z <= self.max_zoom
    }
}

/// Verify the magic number at offset 0.
pub fn check_magic(bytes: &[u8]) -> Result<(), FormatError> {
    if bytes.len() < 2 {
        return Err(FormatError::HeaderTooShort {
            required: HEADER_SIZE_BYTES,
            actual: bytes.len(),
        });
    }
    let magic = read_u16_le(bytes, 0);
    if magic != MAGIC {
        return Err(FormatError::InvalidMagic(magic));
    }
    Ok(())
}

/// Detect the layout generation of an archive from its leading bytes.
///
/// Spec versions 1 and 2 store their version as a u16 at offset 2; version 3
/// stores "Tiles" there, so anything else is treated as version 3.
pub fn detect_version(bytes: &[u8]) -> u8 {
    if bytes.len() < 4 {
        return MAX_SPEC_VERSION;
    }
    match read_u16_le(bytes, 2) {
        v @ (1 | 2) => {
            warn!(
                spec_version = v,
                "PMTiles spec version {} has been deprecated; upgrade the archive to version 3", v
            );
            v as u8
        }
        _ => MAX_SPEC_VERSION,
    }
}

#[inline]
fn read_u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[inline]
fn read_i32_le(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline]
fn read_u64_le(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

#[inline]
fn read_coord(bytes: &[u8], offset: usize) -> f64 {
    f64::from(read_i32_le(bytes, offset)) / COORD_SCALE
}
