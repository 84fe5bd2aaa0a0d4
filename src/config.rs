//! Configuration management for PMTiles Streamer.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `PMTILES_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use pmtiles_streamer::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Serve(config) = cli.command {
//!     println!("Listening on {}", config.bind_address());
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `PMTILES_HOST` - Server bind address (default: 0.0.0.0)
//! - `PMTILES_PORT` - Server port (default: 8080)
//! - `PMTILES_S3_BUCKET` - Serve archives from this S3 bucket
//! - `PMTILES_HTTP_BASE_URL` - Serve archives from this HTTP origin
//! - `PMTILES_LOCAL_DIR` - Serve archives from this directory
//! - `PMTILES_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `PMTILES_S3_REGION` - AWS region (default: us-east-1)
//! - `PMTILES_PATH` - Object key template, e.g. `tiles/{name}.pmtiles`
//! - `PMTILES_CACHE_ENTRIES` - Max cached headers/directories (default: 25)
//! - `PMTILES_NO_PREFETCH` - Skip root directory prefetch
//! - `PMTILES_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 86400)
//! - `PMTILES_ALLOWED_ORIGINS` - Comma-separated CORS allow-list
//! - `PMTILES_PUBLIC_HOSTNAME` - Hostname advertised in TileJSON

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default number of cache entries.
pub const DEFAULT_CACHE_ENTRIES: usize = 25;

pub use crate::server::DEFAULT_CACHE_MAX_AGE;

// =============================================================================
// CLI Arguments
// =============================================================================

/// PMTiles Streamer - A tile server for PMTiles archives.
///
/// Serves map tiles out of single-file PMTiles archives on S3, an HTTP
/// origin, or local disk using range requests.
#[derive(Parser, Debug, Clone)]
#[command(name = "pmtiles-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the tile server
    Serve(ServeConfig),

    /// Print the header and metadata of an archive
    Inspect(InspectConfig),
}

/// Where archives are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    S3 { bucket: String },
    Http { base_url: String },
    Local { dir: PathBuf },
}

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PMTILES_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PMTILES_PORT")]
    pub port: u16,

    // =========================================================================
    // Archive Storage
    // =========================================================================
    /// S3 bucket containing the archives.
    #[arg(long, env = "PMTILES_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Base URL of an HTTP origin serving the archives.
    #[arg(long, env = "PMTILES_HTTP_BASE_URL")]
    pub http_base_url: Option<String>,

    /// Local directory containing the archives.
    #[arg(long, env = "PMTILES_LOCAL_DIR")]
    pub local_dir: Option<PathBuf>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, R2, etc.).
    ///
    /// If not specified, uses the default AWS S3 endpoint.
    #[arg(long, env = "PMTILES_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "PMTILES_S3_REGION")]
    pub s3_region: String,

    /// Object key template; `{name}` is replaced by the archive name.
    ///
    /// Defaults to `{name}.pmtiles`.
    #[arg(long, env = "PMTILES_PATH")]
    pub pmtiles_path: Option<String>,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of cached headers, directories and byte ranges.
    #[arg(long, default_value_t = DEFAULT_CACHE_ENTRIES, env = "PMTILES_CACHE_ENTRIES")]
    pub cache_entries: usize,

    /// Do not decode the root directory from the initial header read.
    #[arg(long, default_value_t = false, env = "PMTILES_NO_PREFETCH")]
    pub no_prefetch: bool,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "PMTILES_CACHE_MAX_AGE")]
    pub cache_max_age: u64,

    // =========================================================================
    // CORS / TileJSON
    // =========================================================================
    /// Allowed CORS origins (comma-separated, `*` for any).
    #[arg(long, env = "PMTILES_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Hostname used in TileJSON tile URLs instead of the request Host.
    #[arg(long, env = "PMTILES_PUBLIC_HOSTNAME")]
    pub public_hostname: Option<String>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        let backends = [
            self.s3_bucket.is_some(),
            self.http_base_url.is_some(),
            self.local_dir.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if backends != 1 {
            return Err(
                "Exactly one archive backend is required. \
                 Set one of --s3-bucket, --http-base-url or --local-dir"
                    .to_string(),
            );
        }

        if self.s3_bucket.as_deref() == Some("") {
            return Err("S3 bucket name must not be empty".to_string());
        }
        if let Some(url) = &self.http_base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("http_base_url must start with http:// or https://".to_string());
            }
        }

        if self.cache_entries == 0 {
            return Err("cache_entries must be greater than 0".to_string());
        }

        if self.pmtiles_path.as_deref() == Some("") {
            return Err("pmtiles_path must not be empty".to_string());
        }

        Ok(())
    }

    /// The configured archive backend (call validate() first).
    pub fn backend(&self) -> Option<Backend> {
        if let Some(bucket) = &self.s3_bucket {
            return Some(Backend::S3 {
                bucket: bucket.clone(),
            });
        }
        if let Some(base_url) = &self.http_base_url {
            return Some(Backend::Http {
                base_url: base_url.clone(),
            });
        }
        self.local_dir
            .as_ref()
            .map(|dir| Backend::Local { dir: dir.clone() })
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Archive path or http(s) URL.
    pub archive: String,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InspectConfig {
    /// Whether the archive is fetched over HTTP.
    pub fn is_remote(&self) -> bool {
        self.archive.starts_with("http://") || self.archive.starts_with("https://")
    }
}

// =============================================================================
// Tests
// =============================================================================
