//! Prediction and recommendation result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PipelineError;

/// Unscaled predictions per target, one value per window row.
///
/// Row order matches the input window: the last value of each series is
/// the "current" prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionSet {
    series: BTreeMap<String, Vec<f64>>,
}

impl PredictionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target_id: impl Into<String>, values: Vec<f64>) {
        self.series.insert(target_id.into(), values);
    }

    pub fn get(&self, target_id: &str) -> Option<&[f64]> {
        self.series.get(target_id).map(Vec::as_slice)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Last value of one target's series.
    pub fn last_value(&self, target_id: &str) -> Result<f64, PipelineError> {
        self.get(target_id)
            .and_then(|v| v.last().copied())
            .ok_or_else(|| PipelineError::UnknownTarget(target_id.to_string()))
    }

    /// Single-row view of the last window row.
    pub fn last_row(&self) -> BTreeMap<String, f64> {
        self.series
            .iter()
            .filter_map(|(k, v)| v.last().map(|x| (k.clone(), *x)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<f64>)> {
        self.series.iter()
    }
}

impl FromIterator<(String, Vec<f64>)> for PredictionSet {
    fn from_iter<I: IntoIterator<Item = (String, Vec<f64>)>>(iter: I) -> Self {
        Self {
            series: iter.into_iter().collect(),
        }
    }
}

/// Current-row quality predictions from the forward pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityPredictions {
    pub elongation: f64,
    pub uts: f64,
    pub conductivity: f64,
}

/// Inverse pipeline output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverseOutcome {
    /// Every window row's recommendation.
    pub all_results: PredictionSet,
    /// The last row only.
    pub last_result: BTreeMap<String, f64>,
}

/// Operator-submitted quality targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DesiredValues {
    pub elongation: f64,
    pub uts: f64,
    pub conductivity: f64,
}

/// Result of one full cycle, shaped like the `/api/final_prediction` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub predictions: QualityPredictions,
    /// `actual - recommended` per recommended parameter.
    pub differences: BTreeMap<String, f64>,
    /// Last raw snapshot values for the tracked process parameters.
    pub original: BTreeMap<String, f64>,
    /// Recommended parameter values (last inverse row).
    pub prediction: BTreeMap<String, f64>,
    pub completed_at: DateTime<Utc>,
}
