//! Construction-time resolution of configured backend kinds
//!
//! Each backend kind referenced by the configuration is resolved to a
//! concrete instance exactly once; the write and read sets share that
//! instance. Missing parameters for a referenced kind fail construction,
//! not the first operation.

use std::collections::HashMap;
use std::sync::Arc;

use run_core::{BackendKind, Error, Result, RunManagerConfig};

use crate::StorageBackend;

/// The resolved backend sets of an orchestrator
pub struct BackendSets {
    /// Backends receiving every mutation, as peers
    pub write_set: Vec<Arc<dyn StorageBackend>>,

    /// Backends consulted on reads, in fallback-priority order
    pub read_set: Vec<Arc<dyn StorageBackend>>,
}

/// Resolve the configured backend kinds into shared instances
pub async fn connect(config: &RunManagerConfig) -> Result<BackendSets> {
    let mut resolved: HashMap<BackendKind, Arc<dyn StorageBackend>> = HashMap::new();

    for kind in config.write_to.iter().chain(config.read_from.iter()) {
        if !resolved.contains_key(kind) {
            let backend = resolve(*kind, config).await?;
            resolved.insert(*kind, backend);
        }
    }

    let write_set = config
        .write_to
        .iter()
        .map(|kind| Arc::clone(&resolved[kind]))
        .collect();
    let read_set = config
        .read_from
        .iter()
        .map(|kind| Arc::clone(&resolved[kind]))
        .collect();

    Ok(BackendSets {
        write_set,
        read_set,
    })
}

async fn resolve(kind: BackendKind, config: &RunManagerConfig) -> Result<Arc<dyn StorageBackend>> {
    match kind {
        #[cfg(feature = "filesystem")]
        BackendKind::Filesystem => {
            let params = config.filesystem.as_ref().ok_or_else(|| missing_params(kind))?;
            let backend: Arc<dyn StorageBackend> =
                Arc::new(crate::FilesystemStorage::new(&params.base_dir));
            Ok(backend)
        }
        #[cfg(feature = "s3")]
        BackendKind::S3 => {
            let params = config.s3.as_ref().ok_or_else(|| missing_params(kind))?;
            let backend: Arc<dyn StorageBackend> =
                Arc::new(crate::S3Storage::connect(params).await);
            Ok(backend)
        }
        // Kinds not compiled into this build
        #[allow(unreachable_patterns)]
        _ => Err(not_compiled(kind)),
    }
}

fn missing_params(kind: BackendKind) -> Error {
    Error::InvalidConfig {
        message: format!("backend '{kind}' is configured but its parameter block is missing"),
    }
}

fn not_compiled(kind: BackendKind) -> Error {
    Error::InvalidConfig {
        message: format!("backend '{kind}' is configured but this build does not include it"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use run_core::FilesystemParams;
    use tempfile::TempDir;

    fn filesystem_config(base_dir: &std::path::Path) -> RunManagerConfig {
        RunManagerConfig {
            write_to: vec![BackendKind::Filesystem],
            read_from: vec![BackendKind::Filesystem],
            filesystem: Some(FilesystemParams {
                base_dir: base_dir.to_path_buf(),
            }),
            s3: None,
        }
    }

    #[tokio::test]
    async fn test_connect_resolves_filesystem() {
        let temp_dir = TempDir::new().unwrap();
        let sets = connect(&filesystem_config(temp_dir.path())).await.unwrap();

        assert_eq!(sets.write_set.len(), 1);
        assert_eq!(sets.read_set.len(), 1);
        assert_eq!(sets.write_set[0].kind(), "filesystem");
    }

    #[tokio::test]
    async fn test_connect_shares_instances_between_sets() {
        let temp_dir = TempDir::new().unwrap();
        let sets = connect(&filesystem_config(temp_dir.path())).await.unwrap();

        assert!(Arc::ptr_eq(&sets.write_set[0], &sets.read_set[0]));
    }

    #[tokio::test]
    async fn test_connect_fails_on_missing_params() {
        let config = RunManagerConfig {
            write_to: vec![BackendKind::Filesystem],
            read_from: vec![BackendKind::Filesystem],
            filesystem: None,
            s3: None,
        };

        let result = connect(&config).await;
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
