//! Storage - Pluggable backends for run configurations and checkpoints
//!
//! Provides the run-aware storage contract plus concrete media:
//! - Local filesystem (default feature)
//! - Amazon S3 / S3-compatible storage (with `s3` feature)
//!
//! # Example
//!
//! ```no_run
//! use storage::{StorageBackend, FilesystemStorage};
//! use bytes::Bytes;
//!
//! # async fn example() -> run_core::Result<()> {
//! let backend = FilesystemStorage::new("/srv/artifacts");
//! backend
//!     .save_checkpoint("aB3dE5f7", "best", Bytes::from(vec![1, 2, 3]))
//!     .await?;
//! let data = backend.load_checkpoint("aB3dE5f7", "best").await?;
//! # Ok(())
//! # }
//! ```

mod backend;
pub mod layout;
pub mod registry;

#[cfg(feature = "filesystem")]
mod filesystem;

#[cfg(feature = "s3")]
mod s3;

pub use backend::StorageBackend;
pub use registry::BackendSets;

#[cfg(feature = "filesystem")]
pub use filesystem::FilesystemStorage;

#[cfg(feature = "s3")]
pub use s3::S3Storage;
