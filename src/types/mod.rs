//! Shared data structures for the rod-line prediction cycle
//!
//! - `FeatureMatrix`: numeric window read off the staged data bus
//! - `PredictionSet`: per-target unscaled predictions, one per window row
//! - `QualityPredictions`, `InverseOutcome`, `CycleReport`: cycle outputs
//! - `ToggleState`: automation on/off flag exposed to operators

mod matrix;
mod prediction;

pub use matrix::*;
pub use prediction::*;

use serde::{Deserialize, Serialize};

/// Automation on/off state as reported to operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    pub enabled: bool,
}
