//! Local filesystem storage backend
//!
//! Provides async file I/O with atomic writes to prevent partial/corrupt
//! artifacts.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use run_core::{Error, Result, RunConfig};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::layout;
use crate::StorageBackend;

/// Local filesystem implementation of [`StorageBackend`]
///
/// Run artifacts are rooted at a configured base directory following the
/// shared [`layout`]:
/// - `{base_dir}/runs/{run_id}/config.yaml`
/// - `{base_dir}/runs/{run_id}/checkpoints/{tag}.pt`
///
/// Writes go to a uuid-suffixed temp file first and are renamed into
/// place, so a crashed write never leaves a partial artifact behind.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    /// Base path for all storage operations
    base_dir: PathBuf,
}

impl FilesystemStorage {
    /// Create a new FilesystemStorage rooted at the given directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Get the base path
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a layout key to an absolute path
    fn resolve(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    /// Generate a unique temporary file path next to the target
    fn temp_path(&self, key: &str) -> PathBuf {
        let full_path = self.resolve(key);
        let temp_name = format!(
            ".{}.{}.tmp",
            full_path.file_name().unwrap_or_default().to_string_lossy(),
            Uuid::new_v4()
        );
        full_path.with_file_name(temp_name)
    }

    /// Write data atomically: temp file, sync, rename
    async fn write_atomic(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve(key);
        let temp_path = self.temp_path(key);

        debug!(?full_path, size = data.len(), "Writing file atomically");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage {
                    message: format!("Failed to create directory {:?}: {}", parent, e),
                })?;
        }

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to create temp file {:?}: {}", temp_path, e),
            })?;

        file.write_all(data).await.map_err(|e| Error::Storage {
            message: format!("Failed to write data: {}", e),
        })?;

        file.sync_all().await.map_err(|e| Error::Storage {
            message: format!("Failed to sync file: {}", e),
        })?;

        fs::rename(&temp_path, &full_path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to rename {:?} to {:?}: {}", temp_path, full_path, e),
            })?;

        Ok(())
    }

    /// Resolve the most recently saved checkpoint tag of a run
    async fn latest_checkpoint_tag(&self, run_id: &str) -> Result<String> {
        let dir = self.resolve(&layout::checkpoint_dir(run_id));

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CheckpointNotFound {
                    tag: "latest".to_string(),
                })
            }
            Err(e) => {
                return Err(Error::Storage {
                    message: format!("Failed to list checkpoints in {:?}: {}", dir, e),
                })
            }
        };

        let mut newest: Option<(String, SystemTime)> = None;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(layout::CHECKPOINT_EXT) {
                continue;
            }
            let Some(tag) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            if newest.as_ref().map_or(true, |(_, best)| modified >= *best) {
                newest = Some((tag.to_string(), modified));
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
impl StorageBackend for FilesystemStorage {
    fn kind(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self, config), fields(backend = "filesystem"))]
    async fn init_run(&self, run_id: &str, config: &RunConfig) -> Result<()> {
        let data = layout::encode_run_config(config)?;
        self.write_atomic(&layout::run_config_path(run_id), &data)
            .await?;

        debug!(run_id, "Run initialized");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn resume_run(&self, run_id: &str, tag: Option<&str>) -> Result<(RunConfig, Bytes)> {
        let config_path = self.resolve(&layout::run_config_path(run_id));

        let raw_config = match fs::read(&config_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::RunNotFound {
                    run_id: run_id.to_string(),
                })
            }
            Err(e) => {
                return Err(Error::Storage {
                    message: format!("Failed to read {:?}: {}", config_path, e),
                })
            }
        };
        let config = layout::decode_run_config(&raw_config)?;

        let tag = match tag {
            Some(tag) => tag.to_string(),
            None => self.latest_checkpoint_tag(run_id).await?,
        };
        let data = self.load_checkpoint(run_id, &tag).await?;

        Ok((config, data))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, run_id: &str, tag: Option<&str>) -> Result<bool> {
        let key = match tag {
            Some(tag) => layout::checkpoint_path(run_id, tag),
            None => layout::run_config_path(run_id),
        };
        Ok(fs::metadata(self.resolve(&key)).await.is_ok())
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn save_checkpoint(&self, run_id: &str, tag: &str, data: Bytes) -> Result<()> {
        self.write_atomic(&layout::checkpoint_path(run_id, tag), &data)
            .await?;

        debug!(run_id, tag, "Checkpoint saved");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn load_checkpoint(&self, run_id: &str, tag: &str) -> Result<Bytes> {
        let full_path = self.resolve(&layout::checkpoint_path(run_id, tag));

        match fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::CheckpointNotFound {
                tag: tag.to_string(),
            }),
            Err(e) => Err(Error::Storage {
                message: format!("Failed to read {:?}: {}", full_path, e),
            }),
        }
    }
}
