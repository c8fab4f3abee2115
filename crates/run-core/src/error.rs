//! Error types for the run orchestration layer

use thiserror::Error;

/// Result type alias using the run orchestration Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for run and checkpoint management
#[derive(Error, Debug)]
pub enum Error {
    // Run errors
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("No active run; call init_run or resume_run first")]
    NoActiveRun,

    // Checkpoint errors
    #[error("Checkpoint not found: {tag}")]
    CheckpointNotFound { tag: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if this error means the run or checkpoint is absent,
    /// as opposed to the backend failing to answer
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::RunNotFound { .. } | Error::CheckpointNotFound { .. }
        )
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage { .. } | Error::Io(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
