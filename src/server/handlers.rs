//! HTTP request handlers for the PMTiles tile API.
//!
//! # Endpoints
//!
//! - `GET|HEAD /{name}/{z}/{x}/{y}.{ext}` - Serve a tile
//! - `GET|HEAD /{name}.json` - Serve TileJSON for an archive
//! - `GET /health` - Health check endpoint
//!
//! Archive names may contain slashes, so tile and TileJSON paths are parsed
//! by [`parse_path`] in a fallback handler rather than by the router.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::archive::{ArchiveProvider, PmTiles, TileLookup};
use crate::cache::ArchiveCache;
use crate::error::{IoError, TileError};
use crate::format::{Header, TileType};

/// Default `Cache-Control: max-age` in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u64 = 86400;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Resolves archive names to sources
    pub provider: Arc<dyn ArchiveProvider>,

    /// Header and directory cache shared by all requests
    pub cache: Arc<dyn ArchiveCache>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u64,

    /// Origins granted `Access-Control-Allow-Origin` (`*` matches any)
    pub allowed_origins: Vec<String>,

    /// Hostname used in TileJSON tile URLs instead of the request `Host`
    pub public_hostname: Option<String>,
}

impl AppState {
    pub fn new(provider: Arc<dyn ArchiveProvider>, cache: Arc<dyn ArchiveCache>) -> Self {
        Self {
            provider,
            cache,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            allowed_origins: Vec::new(),
            public_hostname: None,
        }
    }

    pub fn with_cache_max_age(mut self, seconds: u64) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    pub fn with_public_hostname(mut self, hostname: Option<String>) -> Self {
        self.public_hostname = hostname;
        self
    }
}

// =============================================================================
// Request Paths
// =============================================================================

/// A parsed archive request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchivePath {
    /// `/{name}/{z}/{x}/{y}.{ext}`
    Tile {
        name: String,
        z: u32,
        x: u32,
        y: u32,
        ext: String,
    },

    /// `/{name}.json`
    TileJson { name: String },
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "/!-_.*'()".contains(c)
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_name_char)
}

fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_tile_path(path: &str) -> Option<ArchivePath> {
    let mut parts = path.rsplitn(4, '/');
    let file = parts.next()?;
    let x = parts.next()?;
    let z = parts.next()?;
    let name = parts.next()?;

    let (y, ext) = file.split_once('.')?;
    if ext.is_empty() || !ext.bytes().all(|b| b.is_ascii_lowercase()) {
        return None;
    }
    if !is_valid_name(name) {
        return None;
    }

    Some(ArchivePath::Tile {
        name: name.to_string(),
        z: parse_number(z)?,
        x: parse_number(x)?,
        y: parse_number(y)?,
        ext: ext.to_string(),
    })
}

/// Parse a request path into a tile or TileJSON request.
///
/// Returns `None` for paths matching neither shape.
pub fn parse_path(path: &str) -> Option<ArchivePath> {
    let path = path.strip_prefix('/')?;

    if let Some(tile) = parse_tile_path(path) {
        return Some(tile);
    }

    let name = path.strip_suffix(".json")?;
    is_valid_name(name).then(|| ArchivePath::TileJson {
        name: name.to_string(),
    })
}

/// Pick the allow-list entry granted to `origin`.
///
/// Entries are matched in order and the last match wins.
pub fn allowed_origin<'a>(allowed: &'a [String], origin: Option<&str>) -> Option<&'a str> {
    allowed
        .iter()
        .filter(|entry| entry.as_str() == "*" || Some(entry.as_str()) == origin)
        .last()
        .map(String::as_str)
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for fatal conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_archive")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// TileJSON 3.0.0 document describing an archive.
#[derive(Debug, Serialize)]
pub struct TileJson {
    pub tilejson: &'static str,
    pub scheme: &'static str,
    pub tiles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_layers: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    pub bounds: [f64; 4],
    pub center: (f64, f64, u8),
    pub minzoom: u8,
    pub maxzoom: u8,
}

impl TileJson {
    /// Build the TileJSON for archive `name` served from `hostname`.
    pub fn new(header: &Header, metadata: &Value, hostname: &str, name: &str) -> Self {
        let ext = header
            .tile_type
            .extension()
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        let field = |key: &str| metadata.get(key).cloned();

        Self {
            tilejson: "3.0.0",
            scheme: "xyz",
            tiles: vec![format!(
                "https://{}/{}/{{z}}/{{x}}/{{y}}{}",
                hostname, name, ext
            )],
            vector_layers: field("vector_layers"),
            attribution: field("attribution"),
            description: field("description"),
            name: field("name"),
            version: field("version"),
            bounds: [header.min_lon, header.min_lat, header.max_lon, header.max_lat],
            center: (header.center_lon, header.center_lat, header.center_zoom),
            minzoom: header.min_zoom,
            maxzoom: header.max_zoom,
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

impl TileError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            TileError::Io(io_err) => match io_err {
                IoError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                IoError::S3(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
                IoError::Connection(_) | IoError::BadStatus(_) => {
                    (StatusCode::BAD_GATEWAY, "connection_error")
                }
                IoError::RangeUnsupported { .. } => {
                    (StatusCode::BAD_GATEWAY, "range_unsupported")
                }
                IoError::EtagMismatch { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "archive_changed")
                }
                IoError::InvalidRange { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "invalid_archive")
                }
                IoError::Cancelled | IoError::Local(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "io_error")
                }
            },
            TileError::OutOfRange { .. } => (StatusCode::BAD_REQUEST, "out_of_range"),
            TileError::Format(_) => (StatusCode::INTERNAL_SERVER_ERROR, "invalid_archive"),
            TileError::DirectoryDepthExceeded => {
                (StatusCode::INTERNAL_SERVER_ERROR, "invalid_archive")
            }
            TileError::CacheEntryMismatch { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

/// Convert TileError to HTTP response.
///
/// - 404s are logged at DEBUG level (common and expected)
/// - other 4xx errors are logged at WARN level
/// - 5xx errors are logged at ERROR level
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let message = match &self {
            TileError::Io(IoError::NotFound(key)) => format!("Archive not found: {}", key),
            other => other.to_string(),
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile and TileJSON requests.
///
/// # Response
///
/// - `200 OK`: tile bytes (content type from the archive's tile type) or
///   TileJSON
/// - `204 No Content`: the archive has no tile at these coordinates
/// - `400 Bad Request`: extension does not match the tile type, or x/y lie
///   outside the zoom level
/// - `404 Not Found`: unknown path, zoom outside the archive, or missing
///   archive
/// - `405 Method Not Allowed`: anything but GET and HEAD
/// - `5xx`: JSON [`ErrorResponse`] for broken archives or storage failures
///
/// # Headers
///
/// - `Cache-Control: max-age={cache_max_age}` on non-5xx responses
/// - `Access-Control-Allow-Origin` when the request origin is allowed
/// - `Vary: Origin`
pub async fn archive_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(path) = parse_path(uri.path()) else {
        debug!(path = uri.path(), "Invalid archive path");
        return (StatusCode::NOT_FOUND, "Invalid URL").into_response();
    };

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    let allowed = allowed_origin(&state.allowed_origins, origin)
        .and_then(|o| HeaderValue::from_str(o).ok());

    let mut response = match serve_archive(&state, path, &headers).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };

    let cacheable = !response.status().is_server_error();
    let response_headers = response.headers_mut();
    if cacheable {
        if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", state.cache_max_age)) {
            response_headers.insert(header::CACHE_CONTROL, value);
        }
    }
    if let Some(origin) = allowed {
        response_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    response_headers.insert(header::VARY, HeaderValue::from_static("Origin"));

    if method == Method::HEAD {
        *response.body_mut() = Body::empty();
    }

    response
}

async fn serve_archive(
    state: &AppState,
    path: ArchivePath,
    headers: &HeaderMap,
) -> Result<Response, TileError> {
    let name = match &path {
        ArchivePath::Tile { name, .. } | ArchivePath::TileJson { name } => name.as_str(),
    };

    let source = state.provider.open(name)?;
    let pmtiles = PmTiles::new(source, state.cache.clone());
    let header = pmtiles.get_header().await?;

    let (z, x, y, ext) = match &path {
        ArchivePath::TileJson { name } => {
            let metadata = pmtiles.get_metadata().await?;
            let hostname = state
                .public_hostname
                .as_deref()
                .or_else(|| headers.get(header::HOST).and_then(|v| v.to_str().ok()))
                .unwrap_or("localhost");
            let tile_json = TileJson::new(&header, &metadata, hostname, name);
            return Ok(Json(tile_json).into_response());
        }
        ArchivePath::Tile { z, x, y, ext, .. } => (*z, *x, *y, ext.as_str()),
    };

    if z < u32::from(header.min_zoom) || z > u32::from(header.max_zoom) {
        debug!(name, z, "Zoom outside archive range");
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    if let Some(expected) = header.tile_type.extension() {
        let pbf_alias = header.tile_type == TileType::Mvt && ext == "pbf";
        if ext != expected && !pbf_alias {
            debug!(name, ext, expected, "Extension does not match tile type");
            return Ok((
                StatusCode::BAD_REQUEST,
                format!(
                    "Bad request: requested .{} but archive has type .{}",
                    ext, expected
                ),
            )
                .into_response());
        }
    }

    // z is within the header's u8 zoom range here
    let lookup = pmtiles.get_zxy(z as u8, x, y, None).await?;

    match lookup {
        TileLookup::Tile(tile) => {
            let mut response = Response::new(Body::from(tile.data));
            if let Some(content_type) = header.tile_type.content_type() {
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            Ok(response)
        }
        TileLookup::Empty => Ok(StatusCode::NO_CONTENT.into_response()),
        TileLookup::OutOfZoom => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
