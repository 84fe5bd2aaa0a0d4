use thiserror::Error;

use crate::format::Compression;

/// I/O errors that can occur when fetching byte ranges from a backing store
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Archive not found in the backing store
    #[error("Archive not found: {0}")]
    NotFound(String),

    /// The backing store returned bytes from a different version of the archive
    #[error("ETag mismatch: expected {expected:?}, got {actual:?}")]
    EtagMismatch {
        expected: Option<String>,
        actual: Option<String>,
    },

    /// The backing store ignored the byte range and returned the full object
    #[error(
        "Server returned no content-length header or content-length exceeding request \
         ({content_length:?} > {requested}). Check that your storage backend supports HTTP Byte Serving."
    )]
    RangeUnsupported {
        requested: u64,
        content_length: Option<u64>,
    },

    /// Requested byte range runs past the end of the addressable space
    #[error("Byte range at offset {offset} with length {length} overflows")]
    InvalidRange { offset: u64, length: u64 },

    /// Unexpected HTTP status code
    #[error("Bad response code: {0}")]
    BadStatus(u16),

    /// The fetch was cancelled by the caller
    #[error("Request cancelled")]
    Cancelled,

    /// Local filesystem error
    #[error("Local I/O error: {0}")]
    Local(String),
}

impl IoError {
    /// Whether this error signals a stale cached header.
    pub fn is_etag_mismatch(&self) -> bool {
        matches!(self, IoError::EtagMismatch { .. })
    }
}

/// Errors raised while decoding archive structures
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// Buffer is too small to contain a header
    #[error("Header too short: need at least {required} bytes, got {actual}")]
    HeaderTooShort { required: usize, actual: usize },

    /// Invalid magic number at offset 0
    #[error("Wrong magic number for PMTiles archive: expected 0x4D50, got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Spec version newer than this library understands
    #[error("Archive is spec version {0} but this library supports up to spec version 3")]
    UnsupportedVersion(u8),

    /// Spec version 1 or 2 archive
    #[error("PMTiles spec version {0} has been deprecated; convert the archive to spec version 3")]
    LegacyVersion(u8),

    /// Directory bytes do not decode to a valid entry list
    #[error("Malformed directory: {0}")]
    MalformedDirectory(String),

    /// Varint continuation ran past 10 bytes
    #[error("Malformed directory: varint too long")]
    VarintTooLong,

    /// Compression scheme the configured decompressor cannot handle
    #[error("Compression method not supported: {0:?}")]
    UnsupportedCompression(Compression),

    /// Compressed stream could not be decoded
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// Metadata block is not valid JSON
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
}

/// Errors returned by the archive reader
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// I/O error from the source
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Archive structure error
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Tile coordinates outside the addressable grid
    #[error("Tile ({z}, {x}, {y}) is out of range: {reason}")]
    OutOfRange {
        z: u8,
        x: u32,
        y: u32,
        reason: &'static str,
    },

    /// Directory traversal did not resolve within the depth limit
    #[error("Maximum directory depth exceeded")]
    DirectoryDepthExceeded,

    /// A cache key resolved to a value of the wrong kind
    #[error("Cache entry {key} does not hold a {expected}")]
    CacheEntryMismatch { key: String, expected: &'static str },
}

impl TileError {
    /// Whether this error signals a stale cached header.
    pub fn is_etag_mismatch(&self) -> bool {
        matches!(self, TileError::Io(io) if io.is_etag_mismatch())
    }

    /// Whether the archive itself could not be located.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TileError::Io(IoError::NotFound(_)))
    }
}
