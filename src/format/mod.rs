//! Binary layout of PMTiles archives.
//!
//! This module decodes the on-disk structures of a spec version 3 archive:
//!
//! - [`header`]: the fixed 127-byte header
//! - [`varint`]: the variable-length integer stream used by directories
//! - [`directory`]: directory entries and tile lookup
//! - [`tile_id`]: the Hilbert-curve mapping from (z, x, y) to tile ids
//!
//! Nothing here performs I/O; callers hand in byte slices fetched through a
//! [`crate::io::Source`].

pub mod directory;
pub mod header;
pub mod tile_id;
pub mod varint;

pub use directory::{find_tile, Directory, Entry};
pub use header::{
    check_magic, detect_version, Compression, Header, TileType, HEADER_SIZE_BYTES, MAGIC,
    MAX_SPEC_VERSION,
};
pub use tile_id::{zxy_to_tile_id, MAX_ZOOM};
pub use varint::{VarintReader, MAX_VARINT_LEN};
