//! Persisted artifact layout shared by every backend
//!
//! ```text
//! runs/{run_id}/config.yaml            - run configuration (YAML)
//! runs/{run_id}/checkpoints/{tag}.pt   - opaque checkpoint bytes
//! ```
//!
//! The layout is identical across media so that any backend can serve a
//! run written by any other.

use bytes::Bytes;
use run_core::{Result, RunConfig};

/// File extension of persisted checkpoints
pub const CHECKPOINT_EXT: &str = "pt";

/// Key of a run's persisted configuration
pub fn run_config_path(run_id: &str) -> String {
    format!("runs/{run_id}/config.yaml")
}

/// Key prefix under which a run's checkpoints live
pub fn checkpoint_dir(run_id: &str) -> String {
    format!("runs/{run_id}/checkpoints")
}

/// Key of a single persisted checkpoint
pub fn checkpoint_path(run_id: &str, tag: &str) -> String {
    format!("runs/{run_id}/checkpoints/{tag}.{CHECKPOINT_EXT}")
}

/// Encode a run configuration to its persisted YAML form
pub fn encode_run_config(config: &RunConfig) -> Result<Bytes> {
    let raw = serde_yaml::to_string(config)?;
    Ok(Bytes::from(raw))
}

/// Decode a run configuration from its persisted YAML form
pub fn decode_run_config(data: &[u8]) -> Result<RunConfig> {
    Ok(serde_yaml::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    #[test]
    fn test_paths() {
        assert_eq!(run_config_path("aB3dE5f7"), "runs/aB3dE5f7/config.yaml");
        assert_eq!(
            checkpoint_path("aB3dE5f7", "epoch:0007"),
            "runs/aB3dE5f7/checkpoints/epoch:0007.pt"
        );
        assert_eq!(checkpoint_dir("aB3dE5f7"), "runs/aB3dE5f7/checkpoints");
    }

    #[test]
    fn test_run_config_round_trip() {
        let mut config = RunConfig::new();
        config.insert("batch_size".into(), 32.into());
        config.insert("learning_rate".into(), 3e-4.into());

        let data = encode_run_config(&config).unwrap();
        let decoded = decode_run_config(&data).unwrap();

        let key = Value::from("batch_size");
        assert_eq!(decoded.get(&key).and_then(Value::as_i64), Some(32));
        assert_eq!(decoded, config);
    }
}
