//! Pipeline error taxonomy.
//!
//! Every stage of the prediction cycle reports failures through
//! [`PipelineError`]. The automation controller catches these at the cycle
//! boundary; the HTTP layer maps them to a stable error code and status.

use std::path::PathBuf;
use thiserror::Error;

use crate::bus::Stage;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Model directory missing, unreadable artifact, or unpaired model/scaler.
    #[error("Registry load failed ({dir}): {reason}")]
    RegistryLoad { dir: PathBuf, reason: String },

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Insufficient data: have {have} rows, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("Upstream artifact not ready: {0}")]
    UpstreamNotReady(Stage),

    #[error("Cannot convert {field} to a finite number: {value:?}")]
    TypeConversion { field: String, value: String },

    #[error("Key {0} present in recommendation but missing from original values")]
    KeyMismatch(String),

    #[error("Prediction shape mismatch for {target}: expected {expected} rows, got {actual}")]
    PredictionShape {
        target: String,
        expected: usize,
        actual: usize,
    },

    #[error("Feature width mismatch for {target}: model needs {expected} columns, window has {actual}")]
    FeatureWidth {
        target: String,
        expected: usize,
        actual: usize,
    },

    #[error("Column {column} missing from {artifact}")]
    MissingColumn { artifact: String, column: String },

    #[error("Malformed artifact {artifact}: {reason}")]
    Malformed { artifact: String, reason: String },

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("I/O error ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn registry(dir: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::RegistryLoad {
            dir: dir.into(),
            reason: reason.into(),
        }
    }

    pub fn conversion(field: impl Into<String>, value: impl std::fmt::Display) -> Self {
        Self::TypeConversion {
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Stable machine-readable code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RegistryLoad { .. } => "REGISTRY_LOAD",
            Self::UnknownTarget(_) => "UNKNOWN_TARGET",
            Self::InsufficientData { .. } => "INSUFFICIENT_DATA",
            Self::UpstreamNotReady(_) => "UPSTREAM_NOT_READY",
            Self::TypeConversion { .. } => "TYPE_CONVERSION",
            Self::KeyMismatch(_) => "KEY_MISMATCH",
            Self::PredictionShape { .. } => "PREDICTION_SHAPE",
            Self::FeatureWidth { .. } => "FEATURE_WIDTH",
            Self::MissingColumn { .. } => "MISSING_COLUMN",
            Self::Malformed { .. } => "MALFORMED_ARTIFACT",
            Self::Ingestion(_) => "INGESTION",
            Self::Io { .. } => "IO",
            Self::Storage(_) => "STORAGE",
            Self::Task(_) => "TASK",
        }
    }
}

impl From<sled::Error> for PipelineError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
