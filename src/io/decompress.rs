use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;

use crate::error::FormatError;
use crate::format::Compression;

/// Strategy for decompressing directories, metadata and tiles.
///
/// The archive reader and caches take this as an injected capability so
/// deployments can swap in a different codec set.
pub trait Decompress: Send + Sync {
    /// Decompress `data` according to `compression`.
    fn decompress(&self, data: Bytes, compression: Compression) -> Result<Bytes, FormatError>;
}

/// Decompressor backed by flate2 (gzip) and zstd.
///
/// `None` and `Unknown` pass the bytes through unchanged; Brotli is not
/// supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecompressor;

impl Decompress for DefaultDecompressor {
    fn decompress(&self, data: Bytes, compression: Compression) -> Result<Bytes, FormatError> {
        match compression {
            Compression::None | Compression::Unknown => Ok(data),
            Compression::Gzip => {
                let mut decoder = GzDecoder::new(&data[..]);
                let mut out = Vec::with_capacity(data.len() * 2);
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| FormatError::Decompression(format!("gzip: {}", e)))?;
                Ok(Bytes::from(out))
            }
            Compression::Zstd => zstd::stream::decode_all(&data[..])
                .map(Bytes::from)
                .map_err(|e| FormatError::Decompression(format!("zstd: {}", e))),
            Compression::Brotli => Err(FormatError::UnsupportedCompression(compression)),
        }
    }
}
