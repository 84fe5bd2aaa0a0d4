//! # PMTiles Streamer
//!
//! A tile server for PMTiles archives stored on S3-compatible object storage,
//! an HTTP origin, or local disk.
//!
//! This library reads single-file PMTiles (spec version 3) archives using
//! range requests. A tile lookup costs at most a header read, one to four
//! directory reads, and the tile read itself; headers and directories are
//! cached so most requests only fetch the tile bytes.
//!
//! ## Features
//!
//! - **Range-based streaming**: Fetches only the bytes needed for each tile
//! - **Pluggable sources**: S3, HTTP(S) and local files behind one trait
//! - **Two cache strategies**: a resolved-value LRU and a single-flight
//!   shared-fetch LRU
//! - **ETag consistency**: a replaced archive is detected mid-read and the
//!   lookup is retried against the new version
//! - **Tile server**: z/x/y tiles and TileJSON over axum
//!
//! ## Architecture
//!
//! - [`mod@format`] - Header, varint, directory and tile id decoding
//! - [`io`] - Range sources and decompression
//! - [`cache`] - Header/directory caches
//! - [`archive`] - The tile reader and archive providers
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pmtiles_streamer::{FileSource, PmTiles, SharedPromiseCache, TileLookup};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pmtiles_streamer::TileError> {
//!     let source = Arc::new(FileSource::new("world.pmtiles"));
//!     let archive = PmTiles::new(source, Arc::new(SharedPromiseCache::default()));
//!
//!     if let TileLookup::Tile(tile) = archive.get_zxy(0, 0, 0, None).await? {
//!         println!("{} bytes", tile.data.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod server;

// Re-export commonly used types
pub use archive::{
    ArchiveProvider, HttpArchiveProvider, LocalArchiveProvider, PmTiles, S3ArchiveProvider,
    TileData, TileLookup,
};
pub use cache::{ArchiveCache, CachedValue, ResolvedValueCache, SharedPromiseCache};
pub use config::{Backend, Cli, Command, InspectConfig, ServeConfig};
pub use error::{FormatError, IoError, TileError};
pub use format::{zxy_to_tile_id, Compression, Directory, Entry, Header, TileType};
pub use io::{
    create_s3_client, Decompress, DefaultDecompressor, FileSource, HttpSource, RangeResponse,
    S3Source, Source,
};
pub use server::{create_router, AppState, RouterConfig};
