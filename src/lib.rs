//! Rodline: closed-loop quality inference for cast-and-roll rod lines
//!
//! Predicts downstream quality (elongation, UTS, conductivity) from sensor
//! snapshots, then runs an inverse model family to recommend the process
//! parameters that reach operator-set quality targets.
//!
//! ## Architecture
//!
//! - **Registry**: hot-reloadable (model, target-scaler) pairs per target
//! - **Pipeline**: forward and inverse windowed inference plus the full cycle
//! - **Bus**: named CSV artifacts with atomic replace between stages
//! - **Automation**: toggleable scheduled cycle with an overlap guard
//! - **Delta**: actual minus recommended per process parameter

pub mod acquisition;
pub mod api;
pub mod automation;
pub mod bus;
pub mod config;
pub mod delta;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod storage;
pub mod types;

pub use config::LineConfig;
pub use error::PipelineError;

pub use types::{
    CycleReport, DesiredValues, FeatureMatrix, InverseOutcome, PredictionSet, QualityPredictions,
    ToggleState,
};

pub use automation::{AutomationController, CycleRunner, IntervalScheduler, JobScheduler};
pub use bus::{Stage, StagedBus, Table};
pub use pipeline::{CyclePipeline, ForwardPipeline, InversePipeline};
pub use registry::{ModelRegistry, RegistryEntry};
