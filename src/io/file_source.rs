use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use super::source::{cancellable, RangeResponse, Source};
use crate::error::IoError;

/// Cap on up-front buffer allocation for a single read.
const MAX_PREALLOC: u64 = 1024 * 1024;

/// Local-filesystem implementation of [`Source`].
///
/// Local files carry no validator, so ETag checks always pass.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    identifier: String,
}

impl FileSource {
    /// Create a source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let identifier = path.display().to_string();
        Self { path, identifier }
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes, IoError> {
        let mut file = File::open(&self.path).await.map_err(|e| self.map_err(e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| self.map_err(e))?;

        let mut buf = Vec::with_capacity(length.min(MAX_PREALLOC) as usize);
        file.take(length)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| self.map_err(e))?;

        Ok(Bytes::from(buf))
    }

    fn map_err(&self, e: std::io::Error) -> IoError {
        if e.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(self.identifier.clone())
        } else {
            IoError::Local(format!("{}: {}", self.identifier, e))
        }
    }
}

#[async_trait]
impl Source for FileSource {
    async fn get_bytes(
        &self,
        offset: u64,
        length: u64,
        cancel: Option<&CancellationToken>,
        _etag: Option<&str>,
    ) -> Result<RangeResponse, IoError> {
        let data = cancellable(cancel, self.read_range(offset, length)).await?;
        Ok(RangeResponse::new(data))
    }

    fn key(&self) -> &str {
        &self.identifier
    }
}
