//! Forward prediction: scaled sensor features -> quality metrics.

use std::sync::Arc;

use super::window::WindowPredictor;
use crate::bus::{Stage, StagedBus};
use crate::config::{FeatureScaling, QualityTargets};
use crate::error::PipelineError;
use crate::registry::ModelRegistry;
use crate::types::{FeatureMatrix, PredictionSet, QualityPredictions};

#[derive(Debug, Clone)]
pub struct ForwardPipeline {
    inner: WindowPredictor,
    targets: QualityTargets,
}

impl ForwardPipeline {
    pub fn new(
        registry: Arc<ModelRegistry>,
        window_size: usize,
        scaling: FeatureScaling,
        targets: QualityTargets,
    ) -> Self {
        Self {
            inner: WindowPredictor::new(registry, Stage::ScaledFeatures, window_size, scaling),
            targets,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.inner.registry()
    }

    /// Predict every registered target over the scaled-features artifact.
    pub fn predict(&self, bus: &StagedBus) -> Result<PredictionSet, PipelineError> {
        self.inner.predict_stage(bus)
    }

    pub fn predict_matrix(&self, matrix: &FeatureMatrix) -> Result<PredictionSet, PipelineError> {
        self.inner.predict_matrix(matrix)
    }

    /// Last-row view of the three quality targets.
    pub fn current(&self, set: &PredictionSet) -> Result<QualityPredictions, PipelineError> {
        Ok(QualityPredictions {
            elongation: set.last_value(&self.targets.elongation)?,
            uts: set.last_value(&self.targets.uts)?,
            conductivity: set.last_value(&self.targets.conductivity)?,
        })
    }

    pub fn targets(&self) -> &QualityTargets {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Table;
    use crate::registry::{LinearModel, MinMaxScaler, ModelArtifact, RegistryEntry, RegistrySet};

    fn registry(targets: &[(&str, f64, Vec<f64>)]) -> Arc<ModelRegistry> {
        let entries = targets
            .iter()
            .map(|(id, bias, weights)| {
                let model = ModelArtifact::Gblinear(LinearModel {
                    bias: *bias,
                    weights: weights.clone(),
                });
                let scaler = MinMaxScaler {
                    feature_range: (0.0, 1.0),
                    data_min: vec![0.0],
                    data_max: vec![100.0],
                };
                RegistryEntry::new(*id, Arc::new(model), scaler)
            })
            .collect();
        Arc::new(ModelRegistry::from_set("mem", RegistrySet::new(entries, None)))
    }

    fn matrix(rows: usize) -> FeatureMatrix {
        FeatureMatrix::new(
            vec!["CAST_WHEEL_RPM".into(), "BAR_TEMP_VAL0".into()],
            (0..rows)
                .map(|i| vec![1.0 + i as f64, 950.0 + (i % 3) as f64])
                .collect(),
        )
        .unwrap()
    }

    fn pipeline(window: usize) -> ForwardPipeline {
        ForwardPipeline::new(
            registry(&[
                ("Elongation", 0.1, vec![0.05, 0.0]),
                ("UTS", 0.5, vec![0.1, 0.2]),
                ("Conductivity", 0.6, vec![0.0, 0.1]),
            ]),
            window,
            FeatureScaling::Window,
            QualityTargets::default(),
        )
    }

    #[test]
    fn test_forward_is_deterministic() {
        let p = pipeline(10);
        let m = matrix(25);
        let a = p.predict_matrix(&m).unwrap();
        let b = p.predict_matrix(&m).unwrap();
        for (target, values) in a.iter() {
            let other = b.get(target).unwrap();
            assert_eq!(values.len(), 10);
            assert!(values
                .iter()
                .zip(other)
                .all(|(x, y)| x.to_bits() == y.to_bits()));
        }
    }

    #[test]
    fn test_short_input_is_insufficient_data() {
        let p = pipeline(10);
        assert!(matches!(
            p.predict_matrix(&matrix(9)),
            Err(PipelineError::InsufficientData { have: 9, need: 10 })
        ));
    }

    #[test]
    fn test_current_reads_last_row() {
        let p = pipeline(3);
        let set = p.predict_matrix(&matrix(3)).unwrap();
        let current = p.current(&set).unwrap();
        assert_eq!(current.uts, *set.get("UTS").unwrap().last().unwrap());
    }

    #[test]
    fn test_current_missing_target() {
        let p = ForwardPipeline::new(
            registry(&[("UTS", 0.5, vec![0.1, 0.2])]),
            3,
            FeatureScaling::Window,
            QualityTargets::default(),
        );
        let set = p.predict_matrix(&matrix(3)).unwrap();
        assert!(matches!(
            p.current(&set),
            Err(PipelineError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_persisted_scaling_needs_input_scaler() {
        let p = ForwardPipeline::new(
            registry(&[("UTS", 0.5, vec![0.1, 0.2])]),
            3,
            FeatureScaling::Persisted,
            QualityTargets::default(),
        );
        assert!(matches!(
            p.predict_matrix(&matrix(3)),
            Err(PipelineError::RegistryLoad { .. })
        ));
    }

    #[test]
    fn test_feature_width_mismatch_surfaces() {
        let p = ForwardPipeline::new(
            registry(&[("UTS", 0.5, vec![0.1, 0.2, 0.3])]),
            3,
            FeatureScaling::Window,
            QualityTargets::default(),
        );
        assert!(matches!(
            p.predict_matrix(&matrix(3)),
            Err(PipelineError::FeatureWidth { .. })
        ));
    }

    #[test]
    fn test_predict_reads_scaled_features_stage() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let bus = StagedBus::new(dir.path());
        let p = pipeline(10);
        assert!(matches!(
            p.predict(&bus),
            Err(PipelineError::UpstreamNotReady(Stage::ScaledFeatures))
        ));

        bus.write(Stage::ScaledFeatures, &Table::from_matrix(&matrix(12)))
            .unwrap();
        let set = p.predict(&bus).unwrap();
        assert_eq!(set.len(), 3);
    }
}
