//! Persistent storage
//!
//! - `features`: sled-backed log of manually submitted desired values
//! - `lockfile`: single-process guard over the data directory

pub mod features;
pub mod lockfile;

pub use features::{FeatureRecord, FeatureStore};
pub use lockfile::ProcessLock;

use thiserror::Error;

use crate::error::PipelineError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
