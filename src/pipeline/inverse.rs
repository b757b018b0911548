//! Inverse prediction: desired quality -> recommended process parameters.

use std::sync::Arc;

use super::window::WindowPredictor;
use crate::bus::{Stage, StagedBus};
use crate::config::FeatureScaling;
use crate::error::PipelineError;
use crate::registry::ModelRegistry;
use crate::types::{FeatureMatrix, InverseOutcome, PredictionSet};

#[derive(Debug, Clone)]
pub struct InversePipeline {
    inner: WindowPredictor,
}

impl InversePipeline {
    pub fn new(registry: Arc<ModelRegistry>, window_size: usize, scaling: FeatureScaling) -> Self {
        Self {
            inner: WindowPredictor::new(registry, Stage::ScaledReverse, window_size, scaling),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.inner.registry()
    }

    /// Predict every process parameter over the reverse-scaled artifact.
    pub fn predict(&self, bus: &StagedBus) -> Result<InverseOutcome, PipelineError> {
        Ok(outcome(self.inner.predict_stage(bus)?))
    }

    pub fn predict_matrix(&self, matrix: &FeatureMatrix) -> Result<InverseOutcome, PipelineError> {
        Ok(outcome(self.inner.predict_matrix(matrix)?))
    }
}

fn outcome(all_results: PredictionSet) -> InverseOutcome {
    InverseOutcome {
        last_result: all_results.last_row(),
        all_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{LinearModel, MinMaxScaler, ModelArtifact, RegistryEntry, RegistrySet};

    #[test]
    fn test_last_result_is_last_window_row() {
        let model = ModelArtifact::Gblinear(LinearModel {
            bias: 0.0,
            weights: vec![1.0, 0.0, 0.0],
        });
        let scaler = MinMaxScaler {
            feature_range: (0.0, 1.0),
            data_min: vec![940.0],
            data_max: vec![960.0],
        };
        let set = RegistrySet::new(
            vec![RegistryEntry::new("BAR_TEMP_VAL0", Arc::new(model), scaler)],
            None,
        );
        let pipeline = InversePipeline::new(
            Arc::new(ModelRegistry::from_set("mem", set)),
            4,
            FeatureScaling::Window,
        );
        let window = FeatureMatrix::new(
            vec!["Elongation".into(), "UTS".into(), "Conductivity".into()],
            vec![
                vec![11.0, 205.0, 58.0],
                vec![12.0, 210.0, 59.0],
                vec![13.0, 215.0, 60.0],
                vec![12.0, 212.0, 61.0],
            ],
        )
        .unwrap();

        let out = pipeline.predict_matrix(&window).unwrap();
        // Elongation scales to [0, 0.5, 1, 0.5] -> 940 + 20x
        assert_eq!(
            out.all_results.get("BAR_TEMP_VAL0").unwrap(),
            &[940.0, 950.0, 960.0, 950.0]
        );
        assert_eq!(out.last_result["BAR_TEMP_VAL0"], 950.0);
    }
}
