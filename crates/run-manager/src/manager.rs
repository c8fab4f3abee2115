//! Run orchestration across write and read backend sets

use std::sync::Arc;

use parking_lot::RwLock;
use run_core::{
    Checkpoint, CheckpointTag, CheckpointType, Device, Error, Result, Run, RunConfig, RunId,
    RunManagerConfig,
};
use storage::{registry, StorageBackend};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Upper bound on concurrent backend writes during a fan-out
const MAX_PARALLEL_WRITES: usize = 5;

/// Orchestrates one active run against two backend sets: the write set
/// receives every mutation concurrently, the read set is consulted in
/// its configured order until one member can serve the request.
///
/// The active run is replaced wholesale by `init_run`/`resume_run`; the
/// replacement is a single swap of the slot, never a partial update. A
/// `save_checkpoint`/`load_checkpoint` racing an in-flight resume may
/// observe either run (benign, last writer wins).
pub struct RunManager {
    write_set: Vec<Arc<dyn StorageBackend>>,
    read_set: Vec<Arc<dyn StorageBackend>>,
    run: RwLock<Option<Arc<Run>>>,
}

impl RunManager {
    /// Create a manager over explicit backend sets
    pub fn new(
        write_set: Vec<Arc<dyn StorageBackend>>,
        read_set: Vec<Arc<dyn StorageBackend>>,
    ) -> Self {
        Self {
            write_set,
            read_set,
            run: RwLock::new(None),
        }
    }

    /// Create a manager from configuration, resolving every referenced
    /// backend kind exactly once
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a referenced backend kind is missing
    /// its parameter block or is not compiled into this build
    pub async fn from_config(config: &RunManagerConfig) -> Result<Self> {
        let sets = registry::connect(config).await?;
        Ok(Self::new(sets.write_set, sets.read_set))
    }

    /// The currently active run, if any
    pub fn active_run(&self) -> Option<Arc<Run>> {
        self.run.read().clone()
    }

    fn require_run(&self) -> Result<Arc<Run>> {
        self.active_run().ok_or(Error::NoActiveRun)
    }

    /// Permits for a write fan-out: one per backend, capped
    fn fanout_permits(&self) -> usize {
        self.write_set.len().clamp(1, MAX_PARALLEL_WRITES)
    }

    /// Initialize a new run with the given training configuration.
    ///
    /// The configuration is fanned out concurrently to every write-set
    /// backend. Every member is invoked regardless of individual
    /// failures; once the fan-out settles, the first observed failure is
    /// returned and writes that already completed elsewhere are not
    /// rolled back. The new run becomes active only on success.
    ///
    /// Returns the freshly generated run identifier.
    #[instrument(skip(self, run_config))]
    pub async fn init_run(&self, run_config: RunConfig) -> Result<RunId> {
        let run = Arc::new(Run::new(run_config));
        info!(
            run_id = run.id(),
            backends = self.write_set.len(),
            "Initializing run"
        );

        let permits = Arc::new(Semaphore::new(self.fanout_permits()));
        let mut tasks = JoinSet::new();
        for backend in &self.write_set {
            let backend = Arc::clone(backend);
            let run = Arc::clone(&run);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|_| Error::Storage {
                    message: "write fan-out semaphore closed".to_string(),
                })?;
                backend.init_run(run.id(), run.config()).await
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(Error::Storage {
                    message: format!("init_run task failed: {e}"),
                })
            });
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let run_id = run.id().to_string();
        *self.run.write() = Some(run);
        Ok(run_id)
    }

    /// Resume the identified run from the read set.
    ///
    /// Backends are probed strictly in their configured order; the first
    /// one that yields both the run configuration and the checkpoint
    /// wins and its run becomes the active run, replacing any previously
    /// held one. A backend that cannot serve the request is skipped:
    /// not-found quietly, any other failure with a warning. Read-set
    /// members are treated as replicas of the same logical run, so one
    /// degraded member must not abort a resume another member can serve.
    ///
    /// With `tag` unset, the serving backend resolves the most recently
    /// saved checkpoint.
    ///
    /// # Errors
    /// `CheckpointNotFound` when no backend could serve the request, or
    /// `RunNotFound` when no backend located the run at all
    #[instrument(skip(self))]
    pub async fn resume_run(
        &self,
        run_id: &str,
        tag: Option<&str>,
    ) -> Result<(RunConfig, Checkpoint)> {
        let mut all_run_not_found = !self.read_set.is_empty();

        for backend in &self.read_set {
            match backend.resume_run(run_id, tag).await {
                Ok((config, data)) => {
                    let checkpoint = Checkpoint::from_bytes(&data, None)?;
                    info!(run_id, backend = backend.kind(), "Resumed run");

                    *self.run.write() = Some(Arc::new(Run::with_id(run_id, config.clone())));
                    return Ok((config, checkpoint));
                }
                Err(Error::RunNotFound { .. }) => {
                    debug!(
                        run_id,
                        backend = backend.kind(),
                        "Run not present, trying next backend"
                    );
                }
                Err(e) if e.is_not_found() => {
                    all_run_not_found = false;
                    debug!(
                        run_id,
                        backend = backend.kind(),
                        "Checkpoint not present, trying next backend"
                    );
                }
                Err(e) => {
                    all_run_not_found = false;
                    warn!(
                        run_id,
                        backend = backend.kind(),
                        error = %e,
                        "Backend failed during resume, trying next"
                    );
                }
            }
        }

        Err(read_fallback_exhausted(run_id, tag, all_run_not_found))
    }

    /// Persist a checkpoint to every write-set backend.
    ///
    /// Fire and forget: the call returns once every submitted write has
    /// settled, but per-backend failures are only logged, never
    /// surfaced. Checkpoint persistence must not abort the training loop
    /// on a single backend hiccup; callers needing durability
    /// confirmation poll `StorageBackend::exists` out of band.
    ///
    /// Returns the tag derived for this checkpoint.
    #[instrument(skip(self, checkpoint), fields(epoch = checkpoint.epoch))]
    pub async fn save_checkpoint(
        &self,
        checkpoint_type: CheckpointType,
        checkpoint: &Checkpoint,
    ) -> Result<CheckpointTag> {
        let run = self.require_run()?;
        let tag = checkpoint_type.tag(checkpoint.epoch);
        let data = checkpoint.to_bytes()?;

        let permits = Arc::new(Semaphore::new(self.fanout_permits()));
        let mut tasks = JoinSet::new();
        for backend in &self.write_set {
            let backend = Arc::clone(backend);
            let run = Arc::clone(&run);
            let tag = tag.clone();
            let data = data.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                if let Err(e) = backend.save_checkpoint(run.id(), &tag, data).await {
                    warn!(
                        backend = backend.kind(),
                        %tag,
                        error = %e,
                        "Checkpoint write failed"
                    );
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        debug!(run_id = run.id(), %tag, "Checkpoint fan-out settled");
        Ok(tag)
    }

    /// Load the checkpoint with the given tag for the active run.
    ///
    /// Same ordered read fallback as [`RunManager::resume_run`]. The
    /// optional device hint is passed through to the payload decode
    /// untouched.
    #[instrument(skip(self, device))]
    pub async fn load_checkpoint(
        &self,
        tag: &str,
        device: Option<&Device>,
    ) -> Result<Checkpoint> {
        let run = self.require_run()?;
        let mut all_run_not_found = !self.read_set.is_empty();

        for backend in &self.read_set {
            match backend.load_checkpoint(run.id(), tag).await {
                Ok(data) => return Checkpoint::from_bytes(&data, device),
                Err(Error::RunNotFound { .. }) => {
                    debug!(
                        run_id = run.id(),
                        backend = backend.kind(),
                        "Run not present, trying next backend"
                    );
                }
                Err(e) if e.is_not_found() => {
                    all_run_not_found = false;
                    debug!(
                        run_id = run.id(),
                        backend = backend.kind(),
                        tag,
                        "Checkpoint not present, trying next backend"
                    );
                }
                Err(e) => {
                    all_run_not_found = false;
                    warn!(
                        run_id = run.id(),
                        backend = backend.kind(),
                        tag,
                        error = %e,
                        "Backend failed during load, trying next"
                    );
                }
            }
        }

        Err(read_fallback_exhausted(run.id(), Some(tag), all_run_not_found))
    }
}

/// Error after every read-set backend has been attempted once
fn read_fallback_exhausted(run_id: &str, tag: Option<&str>, all_run_not_found: bool) -> Error {
    if all_run_not_found {
        Error::RunNotFound {
            run_id: run_id.to_string(),
        }
    } else {
        Error::CheckpointNotFound {
            tag: tag.unwrap_or("latest").to_string(),
        }
    }
}
