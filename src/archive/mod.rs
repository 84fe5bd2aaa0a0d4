//! Archive access: the tile reader and the providers that locate archives.

pub mod provider;
pub mod reader;

pub use provider::{
    archive_key, ArchiveProvider, HttpArchiveProvider, LocalArchiveProvider, S3ArchiveProvider,
};
pub use reader::{PmTiles, TileData, TileLookup, MAX_DIRECTORY_DEPTH};
