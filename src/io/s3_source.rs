use async_trait::async_trait;
use aws_sdk_s3::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::source::{cancellable, etag_mismatch, range_header, strong_etag, RangeResponse, Source};
use crate::error::IoError;

/// S3-backed implementation of [`Source`].
///
/// Reads byte ranges from objects in S3 or S3-compatible storage (MinIO, R2,
/// etc.) using ranged GETs. Expected ETags are sent as `If-Match`, so a
/// replaced object answers 412 instead of serving mixed bytes.
#[derive(Clone)]
pub struct S3Source {
    client: Client,
    bucket: String,
    key: String,
    identifier: String,
}

impl S3Source {
    /// Create a source for the given bucket and key.
    ///
    /// No request is made until the first read.
    pub fn new(client: Client, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let key = key.into();
        let identifier = format!("s3://{}/{}", bucket, key);
        Self {
            client,
            bucket,
            key,
            identifier,
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the object key.
    pub fn object_key(&self) -> &str {
        &self.key
    }

    async fn fetch(
        &self,
        offset: u64,
        length: u64,
        etag: Option<&str>,
    ) -> Result<RangeResponse, IoError> {
        if length == 0 {
            return Ok(RangeResponse::new(bytes::Bytes::new()));
        }

        debug!(object = %self.identifier, offset, length, "Fetching byte range");

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .range(range_header(offset, length)?)
            .set_if_match(etag.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                let is_no_such_key = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);

                let status = e.raw_response().map(|r| r.status().as_u16());

                if is_no_such_key || status == Some(404) {
                    return IoError::NotFound(self.identifier.clone());
                }

                if status == Some(412) {
                    warn!(object = %self.identifier, expected = ?etag, "If-Match precondition failed");
                    return IoError::EtagMismatch {
                        expected: etag.map(str::to_string),
                        actual: None,
                    };
                }

                IoError::S3(e.to_string())
            })?;

        let new_etag = strong_etag(resp.e_tag());

        // Not every S3-compatible store honors If-Match
        if etag_mismatch(etag, new_etag.as_deref()) {
            warn!(object = %self.identifier, expected = ?etag, actual = ?new_etag, "Object changed while reading");
            return Err(IoError::EtagMismatch {
                expected: etag.map(str::to_string),
                actual: new_etag,
            });
        }

        let cache_control = resp.cache_control().map(str::to_string);
        let expires = resp.expires_string().map(str::to_string);

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        Ok(RangeResponse {
            data,
            etag: new_etag,
            cache_control,
            expires,
        })
    }
}

#[async_trait]
impl Source for S3Source {
    async fn get_bytes(
        &self,
        offset: u64,
        length: u64,
        cancel: Option<&CancellationToken>,
        etag: Option<&str>,
    ) -> Result<RangeResponse, IoError> {
        cancellable(cancel, self.fetch(offset, length, etag)).await
    }

    fn key(&self) -> &str {
        &self.identifier
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint:
/// ```ignore
/// let client = create_s3_client(None, "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
