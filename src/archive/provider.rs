//! Mapping archive names from request paths to sources.
//!
//! A provider turns the `<name>` segment of `/<name>/<z>/<x>/<y>.<ext>` into
//! a [`Source`]. The object key is derived from the name, optionally through
//! a template such as `tilesets/{name}/latest.pmtiles`.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use aws_sdk_s3::Client;

use crate::error::IoError;
use crate::io::{FileSource, HttpSource, S3Source, Source};

/// Derive the object key for archive `name`.
///
/// Every `{name}` in `template` is replaced by the name. Without a template
/// the key is `<name>.pmtiles`.
pub fn archive_key(name: &str, template: Option<&str>) -> String {
    match template {
        Some(template) => template.replace("{name}", name),
        None => format!("{}.pmtiles", name),
    }
}

/// Opens sources for named archives.
///
/// Opening is cheap and lazy: no I/O happens until the source is read.
pub trait ArchiveProvider: Send + Sync {
    fn open(&self, name: &str) -> Result<Arc<dyn Source>, IoError>;
}

// =============================================================================
// S3
// =============================================================================

/// Serves archives from an S3 bucket.
#[derive(Clone)]
pub struct S3ArchiveProvider {
    client: Client,
    bucket: String,
    template: Option<String>,
}

impl S3ArchiveProvider {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            template: None,
        }
    }

    /// Derive object keys through `template`.
    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ArchiveProvider for S3ArchiveProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn Source>, IoError> {
        let key = archive_key(name, self.template.as_deref());
        Ok(Arc::new(S3Source::new(
            self.client.clone(),
            self.bucket.clone(),
            key,
        )))
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// Serves archives from an HTTP origin, as `<base_url>/<key>`.
#[derive(Clone)]
pub struct HttpArchiveProvider {
    client: reqwest::Client,
    base_url: String,
    template: Option<String>,
}

impl HttpArchiveProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            template: None,
        }
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    /// URL of archive `name`.
    pub fn url_for(&self, name: &str) -> String {
        let key = archive_key(name, self.template.as_deref());
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

impl ArchiveProvider for HttpArchiveProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn Source>, IoError> {
        Ok(Arc::new(HttpSource::with_client(
            self.client.clone(),
            self.url_for(name),
        )))
    }
}

// =============================================================================
// Local directory
// =============================================================================

/// Serves archives from a local directory.
#[derive(Debug, Clone)]
pub struct LocalArchiveProvider {
    root: PathBuf,
    template: Option<String>,
}

impl LocalArchiveProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            template: None,
        }
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    /// Path of archive `name`, refusing keys that leave the root directory.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, IoError> {
        let key = archive_key(name, self.template.as_deref());
        let relative = Path::new(&key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(IoError::NotFound(key));
        }
        Ok(self.root.join(relative))
    }
}

impl ArchiveProvider for LocalArchiveProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn Source>, IoError> {
        Ok(Arc::new(FileSource::new(self.path_for(name)?)))
    }
}
