//! Default bus transforms feeding the two prediction directions.
//!
//! Feature engineering proper lives outside this crate; these projections
//! select and order the numeric columns each model family expects and
//! leave normalization to the window predictor.

use tracing::debug;

use crate::bus::{Stage, StagedBus, Table};
use crate::config::QualityTargets;
use crate::error::PipelineError;

/// One bus-to-bus transform step.
pub trait Preprocessor: Send + Sync {
    /// Run the step, returning the number of rows written.
    fn run(&self, bus: &StagedBus) -> Result<usize, PipelineError>;

    fn name(&self) -> &'static str;
}

/// `input_data.csv` -> `scaled_data.csv`.
#[derive(Debug, Clone, Default)]
pub struct ForwardProjection {
    feature_columns: Vec<String>,
}

impl ForwardProjection {
    /// An empty column list selects every fully numeric column.
    pub fn new(feature_columns: Vec<String>) -> Self {
        Self { feature_columns }
    }
}

impl Preprocessor for ForwardProjection {
    fn run(&self, bus: &StagedBus) -> Result<usize, PipelineError> {
        let raw = bus.read(Stage::RawInput)?;
        let columns = if self.feature_columns.is_empty() {
            raw.numeric_columns()
        } else {
            self.feature_columns.clone()
        };
        if columns.is_empty() {
            return Err(PipelineError::Malformed {
                artifact: Stage::RawInput.file_name().to_string(),
                reason: "no numeric feature columns".to_string(),
            });
        }

        let matrix = raw.project(Stage::RawInput.file_name(), &columns)?;
        bus.write(Stage::ScaledFeatures, &Table::from_matrix(&matrix))?;
        debug!(rows = matrix.len(), columns = matrix.width(), "Forward features staged");
        Ok(matrix.len())
    }

    fn name(&self) -> &'static str {
        "forward_projection"
    }
}

/// `desired_values.csv` (or the current intermediate row) ->
/// `scaled_reverse_data.csv`, projected on the quality targets.
#[derive(Debug, Clone, Default)]
pub struct ReverseProjection {
    targets: QualityTargets,
}

impl ReverseProjection {
    pub fn new(targets: QualityTargets) -> Self {
        Self { targets }
    }
}

impl Preprocessor for ReverseProjection {
    fn run(&self, bus: &StagedBus) -> Result<usize, PipelineError> {
        // The forward half of the cycle must have run first.
        let intermediate = bus.read(Stage::IntermediateFeatures)?;

        let (stage, source) = match bus.read(Stage::DesiredValues) {
            Ok(log) if !log.is_empty() => (Stage::DesiredValues, log),
            Ok(_) | Err(PipelineError::UpstreamNotReady(_)) => {
                (Stage::IntermediateFeatures, intermediate)
            }
            Err(e) => return Err(e),
        };

        let columns: Vec<String> = self
            .targets
            .ordered()
            .iter()
            .map(|t| (*t).to_string())
            .collect();
        let matrix = source.project(stage.file_name(), &columns)?;
        bus.write(Stage::ScaledReverse, &Table::from_matrix(&matrix))?;
        debug!(source = %stage, rows = matrix.len(), "Reverse features staged");
        Ok(matrix.len())
    }

    fn name(&self) -> &'static str {
        "reverse_projection"
    }
}
