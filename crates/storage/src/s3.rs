//! S3 storage backend
//!
//! Provides async S3-compatible persistence for run artifacts with:
//! - Exponential backoff retry logic for transient failures
//! - Custom endpoint support (for MinIO, LocalStack, etc.)

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{config::Builder as S3ConfigBuilder, primitives::ByteStream, Client};
use bytes::Bytes;
use run_core::{Error, Result, RunConfig, S3Params};
use tracing::{debug, instrument, warn};

use crate::layout;
use crate::StorageBackend;

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const BASE_RETRY_DELAY_MS: u64 = 100;

/// S3-compatible implementation of [`StorageBackend`]
///
/// Run artifacts live under the shared [`layout`] keys, below an optional
/// bucket-level prefix. Supports Amazon S3 and S3-compatible services
/// like MinIO.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Create a new S3Storage from backend parameters
    ///
    /// Credentials come from the environment or instance profile.
    pub async fn connect(params: &S3Params) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(params.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(endpoint) = &params.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if params.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Self {
            client,
            bucket: params.bucket.clone(),
            prefix: params.prefix.clone().unwrap_or_default(),
        }
    }

    /// Get the full S3 key for a layout path
    fn key(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), path)
        }
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    let delay = Duration::from_millis(BASE_RETRY_DELAY_MS * (1 << attempt));
                    warn!(
                        %operation,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Storage {
            message: format!("{} failed after {} retries", operation, MAX_RETRIES),
        }))
    }

    /// Fetch an object's bytes
    async fn get(&self, key: &str) -> Result<Bytes> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: format!("S3 get_object failed for {}: {}", key, e),
            })?;

        let data = result.body.collect().await.map_err(|e| Error::Storage {
            message: format!("Failed to read S3 response body: {}", e),
        })?;

        Ok(Bytes::from(data.to_vec()))
    }

    /// Store an object's bytes
    async fn put(&self, key: &str, data: &Bytes) -> Result<()> {
        self.with_retry("put_object", || {
            let data = data.clone();
            let key = key.to_string();
            async move {
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .body(ByteStream::from(data.to_vec()))
                    .send()
                    .await
                    .map_err(|e| Error::Storage {
                        message: format!("S3 put_object failed for {}: {}", key, e),
                    })?;

                Ok(())
            }
        })
        .await
    }

    /// Whether an object exists
    async fn head(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("404") {
                    Ok(false)
                } else {
                    Err(Error::Storage {
                        message: format!("S3 head_object failed for {}: {}", key, e),
                    })
                }
            }
        }
    }

    /// Resolve the most recently saved checkpoint tag of a run
    async fn latest_checkpoint_tag(&self, run_id: &str) -> Result<String> {
        let list_prefix = format!("{}/", self.key(&layout::checkpoint_dir(run_id)));
        debug!(%list_prefix, "Listing checkpoints");

        let mut newest: Option<(String, f64)> = None;
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&list_prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| Error::Storage {
                message: format!("S3 list_objects failed: {}", e),
            })?;

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                let Some(name) = key.rsplit('/').next() else {
                    continue;
                };
                let Some(tag) = name.strip_suffix(".pt") else {
                    continue;
                };
                let modified = object
                    .last_modified()
                    .map(|t| t.as_secs_f64())
                    .unwrap_or_default();
                if newest.as_ref().map_or(true, |(_, best)| modified >= *best) {
                    newest = Some((tag.to_string(), modified));
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        newest
            .map(|(tag, _)| tag)
            .ok_or_else(|| Error::CheckpointNotFound {
                tag: "latest".to_string(),
            })
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn kind(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self, config), fields(backend = "s3", bucket = %self.bucket))]
    async fn init_run(&self, run_id: &str, config: &RunConfig) -> Result<()> {
        let key = self.key(&layout::run_config_path(run_id));
        let data = layout::encode_run_config(config)?;

        self.put(&key, &data).await?;

        debug!(run_id, %key, "Run initialized");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn resume_run(&self, run_id: &str, tag: Option<&str>) -> Result<(RunConfig, Bytes)> {
        let config_key = self.key(&layout::run_config_path(run_id));

        // Confirm the run exists before downloading anything.
        if !self.head(&config_key).await? {
            return Err(Error::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let tag = match tag {
            Some(tag) => tag.to_string(),
            None => self.latest_checkpoint_tag(run_id).await?,
        };

        let raw_config = self.with_retry("get_config", || self.get(&config_key)).await?;
        let config = layout::decode_run_config(&raw_config)?;

        let data = self.load_checkpoint(run_id, &tag).await?;

        Ok((config, data))
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn exists(&self, run_id: &str, tag: Option<&str>) -> Result<bool> {
        let key = match tag {
            Some(tag) => self.key(&layout::checkpoint_path(run_id, tag)),
            None => self.key(&layout::run_config_path(run_id)),
        };
        self.head(&key).await
    }

    #[instrument(skip(self, data), fields(backend = "s3", bucket = %self.bucket, size = data.len()))]
    async fn save_checkpoint(&self, run_id: &str, tag: &str, data: Bytes) -> Result<()> {
        let key = self.key(&layout::checkpoint_path(run_id, tag));

        self.put(&key, &data).await?;

        debug!(run_id, tag, %key, "Checkpoint saved");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn load_checkpoint(&self, run_id: &str, tag: &str) -> Result<Bytes> {
        let key = self.key(&layout::checkpoint_path(run_id, tag));

        self.with_retry("load_checkpoint", || async {
            match self.get(&key).await {
                Ok(data) => Ok(data),
                Err(Error::Storage { message }) if message.contains("NoSuchKey") => {
                    Err(Error::CheckpointNotFound {
                        tag: tag.to_string(),
                    })
                }
                Err(e) => Err(e),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Key mapping logic exercised without a live client
    fn make_key(prefix: &str, path: &str) -> String {
        if prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", prefix.trim_end_matches('/'), path)
        }
    }

    #[test]
    fn test_key_with_prefix() {
        assert_eq!(
            make_key("training/", &layout::run_config_path("aB3dE5f7")),
            "training/runs/aB3dE5f7/config.yaml"
        );
        assert_eq!(
            make_key("training", &layout::checkpoint_path("aB3dE5f7", "best")),
            "training/runs/aB3dE5f7/checkpoints/best.pt"
        );
    }

    #[test]
    fn test_key_without_prefix() {
        assert_eq!(
            make_key("", &layout::run_config_path("aB3dE5f7")),
            "runs/aB3dE5f7/config.yaml"
        );
    }

    #[test]
    fn test_tag_extraction_from_listing_key() {
        let key = "training/runs/aB3dE5f7/checkpoints/epoch:0042.pt";
        let tag = key
            .rsplit('/')
            .next()
            .and_then(|name| name.strip_suffix(".pt"));
        assert_eq!(tag, Some("epoch:0042"));
    }
}
