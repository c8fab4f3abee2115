//! End-to-end run lifecycle over real filesystem backends

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use run_core::{BackendKind, Checkpoint, CheckpointType, Error, FilesystemParams, RunConfig, RunManagerConfig};
use run_manager::RunManager;
use serde_yaml::Value;
use storage::{FilesystemStorage, StorageBackend};
use tempfile::TempDir;
use tokio::time::sleep;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn sample_config() -> RunConfig {
    let mut config = RunConfig::new();
    config.insert("batch_size".into(), 32.into());
    config
}

fn sample_checkpoint(epoch: u64) -> Checkpoint {
    Checkpoint::new(epoch, 0.95, 0.88, vec![5u8, 6, 7, 9, 200])
}

/// A manager whose write and read sets are filesystem backends rooted at
/// the given directories, in order
fn manager_over(roots: &[&Path]) -> RunManager {
    let backends: Vec<Arc<dyn StorageBackend>> = roots
        .iter()
        .map(|root| Arc::new(FilesystemStorage::new(root)) as Arc<dyn StorageBackend>)
        .collect();
    RunManager::new(backends.clone(), backends)
}

#[tokio::test]
async fn test_init_run_writes_config_to_every_backend() -> Result<()> {
    init_tracing();
    let (root_a, root_b) = (TempDir::new()?, TempDir::new()?);
    let manager = manager_over(&[root_a.path(), root_b.path()]);

    let run_id = manager.init_run(sample_config()).await?;

    for root in [root_a.path(), root_b.path()] {
        let config_path = root.join(format!("runs/{run_id}/config.yaml"));
        assert!(config_path.exists(), "missing config in {config_path:?}");

        let decoded: RunConfig = serde_yaml::from_str(&std::fs::read_to_string(&config_path)?)?;
        let key = Value::from("batch_size");
        assert_eq!(decoded.get(&key).and_then(Value::as_i64), Some(32));
    }

    Ok(())
}

#[tokio::test]
async fn test_save_checkpoint_persists_exact_bytes_under_derived_tag() -> Result<()> {
    init_tracing();
    let (root_a, root_b) = (TempDir::new()?, TempDir::new()?);
    let manager = manager_over(&[root_a.path(), root_b.path()]);

    let run_id = manager.init_run(sample_config()).await?;
    let checkpoint = sample_checkpoint(7);
    let tag = manager
        .save_checkpoint(CheckpointType::Epoch, &checkpoint)
        .await?;
    assert_eq!(tag, "epoch:0007");

    let expected = checkpoint.to_bytes()?;
    for root in [root_a.path(), root_b.path()] {
        let path = root.join(format!("runs/{run_id}/checkpoints/epoch:0007.pt"));
        assert!(path.exists(), "missing checkpoint in {path:?}");
        assert_eq!(Bytes::from(std::fs::read(&path)?), expected);
    }

    Ok(())
}

#[tokio::test]
async fn test_resume_falls_back_to_second_backend() -> Result<()> {
    init_tracing();
    let (root_a, root_b) = (TempDir::new()?, TempDir::new()?);

    // Only the second backend holds the run.
    let writer = manager_over(&[root_b.path()]);
    let run_id = writer.init_run(sample_config()).await?;
    writer
        .save_checkpoint(CheckpointType::Best, &sample_checkpoint(3))
        .await?;

    let reader = manager_over(&[root_a.path(), root_b.path()]);
    let (config, checkpoint) = reader.resume_run(&run_id, Some("best")).await?;

    assert_eq!(config, sample_config());
    assert_eq!(checkpoint, sample_checkpoint(3));
    assert_eq!(reader.active_run().unwrap().id(), run_id);

    Ok(())
}

#[tokio::test]
async fn test_full_cycle_resumes_latest_checkpoint() -> Result<()> {
    init_tracing();
    let (root_a, root_b) = (TempDir::new()?, TempDir::new()?);
    let manager = manager_over(&[root_a.path(), root_b.path()]);

    let run_id = manager.init_run(sample_config()).await?;
    manager
        .save_checkpoint(CheckpointType::Epoch, &sample_checkpoint(1))
        .await?;
    // mtime granularity guard
    sleep(Duration::from_millis(20)).await;
    manager
        .save_checkpoint(CheckpointType::Epoch, &sample_checkpoint(2))
        .await?;

    let fresh = manager_over(&[root_a.path(), root_b.path()]);
    let (config, checkpoint) = fresh.resume_run(&run_id, None).await?;

    assert_eq!(config, sample_config());
    assert_eq!(checkpoint.epoch, 2);

    // The resumed run is active: a follow-up load works without re-init.
    let loaded = fresh.load_checkpoint("epoch:0001", None).await?;
    assert_eq!(loaded, sample_checkpoint(1));

    Ok(())
}

#[tokio::test]
async fn test_resume_unknown_run_reports_not_found() -> Result<()> {
    init_tracing();
    let root = TempDir::new()?;
    let manager = manager_over(&[root.path()]);

    let result = manager.resume_run("nosuchrn", None).await;
    assert!(matches!(result, Err(Error::RunNotFound { .. })));

    Ok(())
}

#[tokio::test]
async fn test_manager_from_config() -> Result<()> {
    init_tracing();
    let root = TempDir::new()?;
    let config = RunManagerConfig {
        write_to: vec![BackendKind::Filesystem],
        read_from: vec![BackendKind::Filesystem],
        filesystem: Some(FilesystemParams {
            base_dir: root.path().to_path_buf(),
        }),
        s3: None,
    };

    let manager = RunManager::from_config(&config).await?;
    let run_id = manager.init_run(sample_config()).await?;
    manager
        .save_checkpoint(CheckpointType::Final, &sample_checkpoint(9))
        .await?;

    let loaded = manager.load_checkpoint("final", None).await?;
    assert_eq!(loaded.epoch, 9);
    assert!(root
        .path()
        .join(format!("runs/{run_id}/checkpoints/final.pt"))
        .exists());

    Ok(())
}
