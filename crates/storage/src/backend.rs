//! Storage backend trait definition
//!
//! Defines the async contract every storage medium must satisfy. The
//! orchestration layer consumes backends only through this trait and never
//! sees medium internals.

use async_trait::async_trait;
use bytes::Bytes;
use run_core::{Result, RunConfig};

/// Async trait for run-aware storage backends
///
/// Implementors persist and retrieve run configurations and checkpoint
/// bytes under the shared [`layout`](crate::layout). Each backend owns its
/// own durability semantics; the orchestrator treats all backends
/// uniformly through this contract.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stable backend name used in logs and configuration
    fn kind(&self) -> &'static str;

    /// Persist the configuration of a freshly initialized run
    ///
    /// # Errors
    /// Returns `Storage` if the configuration could not be written
    async fn init_run(&self, run_id: &str, config: &RunConfig) -> Result<()>;

    /// Fetch the run's configuration together with the bytes of the
    /// identified checkpoint
    ///
    /// With `tag` unset, the backend resolves the most recently saved
    /// checkpoint of the run.
    ///
    /// # Errors
    /// `RunNotFound` if the run's configuration is absent;
    /// `CheckpointNotFound` if the run exists but the checkpoint does not
    async fn resume_run(&self, run_id: &str, tag: Option<&str>) -> Result<(RunConfig, Bytes)>;

    /// Whether the run (tag unset) or one of its checkpoints exists
    ///
    /// The persisted run configuration is the run-level existence marker.
    async fn exists(&self, run_id: &str, tag: Option<&str>) -> Result<bool>;

    /// Persist checkpoint bytes under the given tag, overwriting any
    /// previous checkpoint with the same tag
    async fn save_checkpoint(&self, run_id: &str, tag: &str, data: Bytes) -> Result<()>;

    /// Fetch the bytes of the identified checkpoint
    ///
    /// # Errors
    /// `CheckpointNotFound` if no checkpoint with this tag exists
    async fn load_checkpoint(&self, run_id: &str, tag: &str) -> Result<Bytes>;
}
