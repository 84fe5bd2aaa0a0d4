//! Router configuration for the PMTiles server.
//!
//! # Route Structure
//!
//! ```text
//! /health                          - Health check
//! /{name}/{z}/{x}/{y}.{ext}        - Tile (fallback handler)
//! /{name}.json                     - TileJSON (fallback handler)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pmtiles_streamer::archive::LocalArchiveProvider;
//! use pmtiles_streamer::cache::SharedPromiseCache;
//! use pmtiles_streamer::server::{create_router, RouterConfig};
//!
//! let provider = Arc::new(LocalArchiveProvider::new("./tiles"));
//! let cache = Arc::new(SharedPromiseCache::default());
//!
//! let config = RouterConfig::new()
//!     .with_allowed_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(provider, cache, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{archive_handler, health_handler, AppState, DEFAULT_CACHE_MAX_AGE};
use crate::archive::ArchiveProvider;
use crate::cache::ArchiveCache;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Cache-Control max-age in seconds
    pub cache_max_age: u64,

    /// Origins granted `Access-Control-Allow-Origin`
    pub allowed_origins: Vec<String>,

    /// Hostname advertised in TileJSON tile URLs
    pub public_hostname: Option<String>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a router configuration with defaults.
    ///
    /// By default:
    /// - Cache max-age is 1 day (86400 seconds)
    /// - No cross-origin access is granted
    /// - TileJSON uses the request `Host`
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            allowed_origins: Vec::new(),
            public_hostname: None,
            enable_tracing: true,
        }
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u64) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Set the allowed origins (`*` allows any).
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Advertise `hostname` in TileJSON instead of the request `Host`.
    pub fn with_public_hostname(mut self, hostname: Option<String>) -> Self {
        self.public_hostname = hostname;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// Archive paths are matched by a fallback handler since archive names may
/// contain slashes.
pub fn create_router(
    provider: Arc<dyn ArchiveProvider>,
    cache: Arc<dyn ArchiveCache>,
    config: RouterConfig,
) -> Router {
    let app_state = AppState::new(provider, cache)
        .with_cache_max_age(config.cache_max_age)
        .with_allowed_origins(config.allowed_origins)
        .with_public_hostname(config.public_hostname);

    let router = Router::new()
        .route("/health", get(health_handler))
        .fallback(archive_handler)
        .with_state(app_state);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

// =============================================================================
// Tests
// =============================================================================
