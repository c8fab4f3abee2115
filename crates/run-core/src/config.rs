//! Configuration consumed at orchestrator construction
//!
//! An explicit value built once at process start and passed by reference
//! into `RunManager::from_config`; there is no process-wide config state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::{Error, Result};

/// Storage backend kind, resolved to a concrete instance by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Local filesystem
    Filesystem,

    /// S3-compatible object storage
    S3,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Filesystem => "filesystem",
            BackendKind::S3 => "s3",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filesystem backend parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemParams {
    /// Directory under which all run artifacts are rooted
    pub base_dir: PathBuf,
}

/// S3 backend parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Params {
    /// Bucket name
    pub bucket: String,

    /// Optional key prefix for all artifacts (e.g. "training/")
    #[serde(default)]
    pub prefix: Option<String>,

    /// Optional custom endpoint URL (for MinIO, LocalStack, etc.)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,

    /// Force path-style addressing (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Orchestrator configuration: the ordered backend sets plus the
/// parameters each referenced backend kind needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManagerConfig {
    /// Backends receiving every mutation, as peers
    pub write_to: Vec<BackendKind>,

    /// Backends consulted on reads, in fallback-priority order
    pub read_from: Vec<BackendKind>,

    /// Parameters for the filesystem backend, required iff referenced
    #[serde(default)]
    pub filesystem: Option<FilesystemParams>,

    /// Parameters for the S3 backend, required iff referenced
    #[serde(default)]
    pub s3: Option<S3Params>,
}

impl Default for RunManagerConfig {
    fn default() -> Self {
        Self {
            write_to: vec![BackendKind::Filesystem],
            read_from: vec![BackendKind::Filesystem],
            filesystem: Some(FilesystemParams {
                base_dir: PathBuf::from("./data"),
            }),
            s3: None,
        }
    }
}

impl RunManagerConfig {
    /// Deserialize a configuration from YAML text
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunManagerConfig::default();
        assert_eq!(config.write_to, vec![BackendKind::Filesystem]);
        assert_eq!(config.read_from, vec![BackendKind::Filesystem]);
        assert!(config.s3.is_none());
    }

    #[test]
    fn test_config_from_yaml() {
        let raw = r#"
write_to:
  - filesystem
  - s3
read_from:
  - s3
  - filesystem
filesystem:
  base_dir: /srv/artifacts
s3:
  bucket: training-runs
  prefix: team-a/
"#;

        let config = RunManagerConfig::from_yaml_str(raw).unwrap();
        assert_eq!(
            config.write_to,
            vec![BackendKind::Filesystem, BackendKind::S3]
        );
        assert_eq!(
            config.read_from,
            vec![BackendKind::S3, BackendKind::Filesystem]
        );
        assert_eq!(
            config.filesystem.unwrap().base_dir,
            PathBuf::from("/srv/artifacts")
        );

        let s3 = config.s3.unwrap();
        assert_eq!(s3.bucket, "training-runs");
        assert_eq!(s3.prefix.as_deref(), Some("team-a/"));
        assert_eq!(s3.region, "us-east-1");
        assert!(!s3.force_path_style);
    }

    #[test]
    fn test_config_rejects_unknown_backend_kind() {
        let raw = r#"
write_to: [tape-archive]
read_from: []
"#;
        assert!(RunManagerConfig::from_yaml_str(raw).is_err());
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = RunManagerConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = RunManagerConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.write_to, config.write_to);
        assert_eq!(parsed.read_from, config.read_from);
    }
}
