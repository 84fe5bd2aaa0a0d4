//! HTTP server layer for PMTiles Streamer.
//!
//! This module provides the HTTP API for serving tiles and TileJSON from
//! PMTiles archives.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        GET /{name}/{z}/{x}/{y}.{ext}   GET /{name}.json         │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (paths, TileJSON, CORS)  │  │      (router config)        │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    allowed_origin, archive_handler, health_handler, parse_path, AppState, ArchivePath,
    ErrorResponse, HealthResponse, TileJson, DEFAULT_CACHE_MAX_AGE,
};
pub use routes::{create_router, RouterConfig};
