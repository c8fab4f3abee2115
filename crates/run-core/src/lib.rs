//! Run Core - Foundation for the run orchestration layer
//!
//! Provides the core domain types, error taxonomy, and configuration
//! surface for the multi-backend run and checkpoint system.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BackendKind, FilesystemParams, RunManagerConfig, S3Params};
pub use error::{Error, Result};
pub use types::*;
