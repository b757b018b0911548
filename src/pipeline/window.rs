//! Shared windowed inference used by both prediction directions.

use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

use crate::bus::{Stage, StagedBus};
use crate::config::FeatureScaling;
use crate::error::PipelineError;
use crate::registry::{MinMaxScaler, ModelRegistry};
use crate::types::{FeatureMatrix, PredictionSet};

/// Runs every registry entry over the last `window_size` rows of a stage.
#[derive(Debug, Clone)]
pub(crate) struct WindowPredictor {
    registry: Arc<ModelRegistry>,
    stage: Stage,
    window_size: usize,
    scaling: FeatureScaling,
}

impl WindowPredictor {
    pub fn new(
        registry: Arc<ModelRegistry>,
        stage: Stage,
        window_size: usize,
        scaling: FeatureScaling,
    ) -> Self {
        Self {
            registry,
            stage,
            window_size,
            scaling,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn predict_stage(&self, bus: &StagedBus) -> Result<PredictionSet, PipelineError> {
        let matrix = bus.read_matrix(self.stage)?;
        self.predict_matrix(&matrix)
    }

    pub fn predict_matrix(&self, matrix: &FeatureMatrix) -> Result<PredictionSet, PipelineError> {
        let window = matrix.window(self.window_size)?;
        // One snapshot for the whole window so a reload mid-prediction
        // cannot mix model sets.
        let set = self.registry.snapshot();

        let scaled = match self.scaling {
            FeatureScaling::Window => MinMaxScaler::fit(&window)?.transform(&window)?,
            FeatureScaling::Persisted => set
                .input_scaler()
                .ok_or_else(|| {
                    PipelineError::registry(
                        self.registry.dir(),
                        "persisted feature scaling needs input_scaler.json",
                    )
                })?
                .transform(&window)?,
        };

        let entries: Vec<_> = set.entries().collect();
        let series = entries
            .par_iter()
            .map(|entry| -> Result<(String, Vec<f64>), PipelineError> {
                Ok((entry.target_id.clone(), entry.predict(&scaled)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            stage = %self.stage,
            rows = scaled.len(),
            targets = series.len(),
            "Window inference complete"
        );
        Ok(series.into_iter().collect())
    }
}
