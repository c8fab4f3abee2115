//! Core domain types for runs and checkpoints

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::Result;

/// Unique identifier types
pub type RunId = String;
pub type CheckpointTag = String;

/// Training epoch counter
pub type Epoch = u64;

/// An arbitrary structured map of training settings; persisted as YAML
pub type RunConfig = serde_yaml::Mapping;

/// Length of generated run identifiers
pub const RUN_ID_LEN: usize = 8;

/// Generate a fresh run identifier: 8 chars drawn from `[A-Za-z0-9]`
/// using the OS entropy source. Uniqueness is probabilistic (62^8 space),
/// never backend-enforced.
pub fn generate_run_id() -> RunId {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(RUN_ID_LEN)
        .map(char::from)
        .collect()
}

/// One logical unit of work: a generated identifier plus the snapshot of
/// the configuration it was started with. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    id: RunId,
    config: RunConfig,
}

impl Run {
    /// Create a run with a freshly generated identifier
    pub fn new(config: RunConfig) -> Self {
        Self {
            id: generate_run_id(),
            config,
        }
    }

    /// Reconstruct a run under a known identifier (resume path)
    pub fn with_id(id: impl Into<RunId>, config: RunConfig) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }

    /// The run id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The run config
    pub fn config(&self) -> &RunConfig {
        &self.config
    }
}

/// Checkpoint type enumeration; determines tag derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointType {
    /// Periodic end-of-epoch checkpoint
    Epoch,

    /// Best-loss-so-far checkpoint
    Best,

    /// Final checkpoint of the run
    Final,
}

impl CheckpointType {
    /// Derive the backend-facing tag for a checkpoint of this type.
    ///
    /// `Best` and `Final` ignore the epoch; `Epoch` zero-pads it to at
    /// least four digits. Two checkpoints with the same type and epoch
    /// map to the same tag, so the second overwrites the first.
    pub fn tag(self, epoch: Epoch) -> CheckpointTag {
        match self {
            CheckpointType::Epoch => format!("epoch:{epoch:04}"),
            CheckpointType::Best => "best".to_string(),
            CheckpointType::Final => "final".to_string(),
        }
    }
}

/// Execution target hint passed through to checkpoint payload decoding
/// (e.g. "cpu", "cuda:0"). Irrelevant to the orchestration layer itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device(String);

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Device {
    fn default() -> Self {
        Self("cpu".to_string())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point-in-time snapshot of a run: the training position plus the
/// opaque payload (model/optimizer state). The payload bytes are never
/// inspected here, only framed for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Epoch this checkpoint was taken at
    pub epoch: Epoch,

    /// Loss of the epoch preceding this checkpoint
    pub prior_loss: f64,

    /// Best loss observed so far in the run
    pub best_loss: f64,

    /// Opaque serialized state
    pub payload: Bytes,
}

impl Checkpoint {
    pub fn new(epoch: Epoch, prior_loss: f64, best_loss: f64, payload: impl Into<Bytes>) -> Self {
        Self {
            epoch,
            prior_loss,
            best_loss,
            payload: payload.into(),
        }
    }

    /// Frame this checkpoint as bytes for backend transport
    pub fn to_bytes(&self) -> Result<Bytes> {
        let data = bincode::serialize(self)?;
        Ok(Bytes::from(data))
    }

    /// Reconstruct a checkpoint from backend bytes.
    ///
    /// The optional device hint is forwarded to whatever materializes the
    /// payload downstream; the envelope decode does not depend on it.
    pub fn from_bytes(data: &[u8], device: Option<&Device>) -> Result<Self> {
        if let Some(device) = device {
            debug!(%device, "Decoding checkpoint for target device");
        }
        Ok(bincode::deserialize(data)?)
    }
}
