use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::runtime::Runtime;
use tracing::debug;

use super::StorageBackend;
use crate::error::StorageError;

/// S3-backed implementation of [`StorageBackend`].
///
/// Dataset paths are object keys within a single bucket; a position directory
/// is a key prefix. The SDK is async, so the backend owns a private
/// current-thread runtime and blocks on every request. Each call is one
/// round trip with no caching.
pub struct S3Storage {
    client: Client,
    bucket: String,
    runtime: Runtime,
}

impl S3Storage {
    /// Connect to `bucket` with an optional custom endpoint (MinIO etc.).
    pub fn connect(
        bucket: impl Into<String>,
        endpoint_url: Option<&str>,
        region: &str,
    ) -> Result<Self, StorageError> {
        let runtime = build_runtime()?;
        let client = runtime.block_on(create_s3_client(endpoint_url, region));
        Ok(Self {
            client,
            bucket: bucket.into(),
            runtime,
        })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: Client, bucket: impl Into<String>) -> Result<Self, StorageError> {
        Ok(Self {
            client,
            bucket: bucket.into(),
            runtime: build_runtime()?,
        })
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn identifier(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

impl StorageBackend for S3Storage {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix.trim_end_matches('/'))
        };

        self.runtime.block_on(async {
            let mut keys = Vec::new();
            let mut continuation_token: Option<String> = None;

            loop {
                let mut request = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&prefix)
                    .max_keys(1000);

                if let Some(token) = continuation_token {
                    request = request.continuation_token(token);
                }

                let result = request
                    .send()
                    .await
                    .map_err(|e| StorageError::S3(e.to_string()))?;

                keys.extend(
                    result
                        .contents()
                        .iter()
                        .filter_map(|obj| obj.key())
                        .map(|k| k.to_string()),
                );

                if result.is_truncated() == Some(true) {
                    continuation_token = result.next_continuation_token().map(|s| s.to_string());
                } else {
                    break;
                }
            }

            debug!(bucket = %self.bucket, prefix = %prefix, count = keys.len(), "Listed objects");
            Ok(keys)
        })
    }

    fn get_bytes(&self, path: &str) -> Result<Bytes, StorageError> {
        self.runtime.block_on(async {
            let resp = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(path)
                .send()
                .await
                .map_err(|e| {
                    let is_not_found = e
                        .as_service_error()
                        .map(|se| se.is_no_such_key())
                        .unwrap_or(false);
                    let status_is_404 = e
                        .raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);

                    if is_not_found || status_is_404 {
                        StorageError::NotFound(self.identifier(path))
                    } else {
                        StorageError::S3(e.to_string())
                    }
                })?;

            let data = resp
                .body
                .collect()
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?
                .into_bytes();

            debug!(object = %self.identifier(path), bytes = data.len(), "Fetched object");
            Ok(data)
        })
    }
}

fn build_runtime() -> Result<Runtime, StorageError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| StorageError::Connection(format!("failed to start I/O runtime: {}", e)))
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
