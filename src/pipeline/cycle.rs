//! Full prediction cycle over the staged bus.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::forward::ForwardPipeline;
use super::inverse::InversePipeline;
use super::preprocess::{ForwardProjection, Preprocessor, ReverseProjection};
use crate::acquisition::Ingestor;
use crate::automation::CycleRunner;
use crate::bus::{Stage, StagedBus, Table};
use crate::config::PipelineConfig;
use crate::delta;
use crate::error::PipelineError;
use crate::types::{CycleReport, QualityPredictions};

/// Ingestion plus every blocking stage of the cycle.
pub struct CyclePipeline {
    ingestor: Arc<dyn Ingestor>,
    stages: Arc<Stages>,
}

/// The synchronous half, run on the blocking pool.
struct Stages {
    bus: Arc<StagedBus>,
    forward_prep: Box<dyn Preprocessor>,
    reverse_prep: Box<dyn Preprocessor>,
    forward: ForwardPipeline,
    inverse: InversePipeline,
    original_value_keys: Vec<String>,
}

impl CyclePipeline {
    /// Wire the default projections from `settings`.
    pub fn new(
        bus: Arc<StagedBus>,
        ingestor: Arc<dyn Ingestor>,
        forward: ForwardPipeline,
        inverse: InversePipeline,
        settings: &PipelineConfig,
    ) -> Self {
        Self::with_preprocessors(
            bus,
            ingestor,
            Box::new(ForwardProjection::new(settings.feature_columns.clone())),
            Box::new(ReverseProjection::new(settings.quality_targets.clone())),
            forward,
            inverse,
            settings.original_value_keys.clone(),
        )
    }

    pub fn with_preprocessors(
        bus: Arc<StagedBus>,
        ingestor: Arc<dyn Ingestor>,
        forward_prep: Box<dyn Preprocessor>,
        reverse_prep: Box<dyn Preprocessor>,
        forward: ForwardPipeline,
        inverse: InversePipeline,
        original_value_keys: Vec<String>,
    ) -> Self {
        Self {
            ingestor,
            stages: Arc::new(Stages {
                bus,
                forward_prep,
                reverse_prep,
                forward,
                inverse,
                original_value_keys,
            }),
        }
    }

    pub fn bus(&self) -> &Arc<StagedBus> {
        &self.stages.bus
    }

    /// Ingest, then forward only: the current quality predictions.
    ///
    /// Rewrites the raw and scaled stages. When a controller drives cycles
    /// on the same bus, go through `AutomationController::run_forward_now`.
    pub async fn dashboard(&self) -> Result<QualityPredictions, PipelineError> {
        self.ingestor.ingest(&self.stages.bus).await?;
        let stages = Arc::clone(&self.stages);
        blocking(move || stages.forward_half().map(|(_, current)| current)).await
    }

    /// Ingest, forward, inverse, delta.
    pub async fn run(&self) -> Result<CycleReport, PipelineError> {
        let rows = self.ingestor.ingest(&self.stages.bus).await?;
        debug!(source = self.ingestor.source_name(), rows = rows, "Cycle ingestion done");
        let stages = Arc::clone(&self.stages);
        blocking(move || stages.full_cycle()).await
    }

    /// Hot-reload both model directories. Both are scanned before either
    /// set is swapped in, so a failure on one side leaves both unchanged.
    pub fn reload_models(&self) -> Result<(usize, usize), PipelineError> {
        let forward_registry = self.stages.forward.registry();
        let inverse_registry = self.stages.inverse.registry();
        let forward = forward_registry.rescan()?;
        let inverse = inverse_registry.rescan()?;
        Ok((
            forward_registry.install(forward),
            inverse_registry.install(inverse),
        ))
    }

    pub fn forward(&self) -> &ForwardPipeline {
        &self.stages.forward
    }

    pub fn inverse(&self) -> &InversePipeline {
        &self.stages.inverse
    }
}

#[async_trait]
impl CycleRunner for CyclePipeline {
    async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        self.run().await
    }

    async fn run_forward(&self) -> Result<QualityPredictions, PipelineError> {
        self.dashboard().await
    }
}

impl Stages {
    fn forward_half(&self) -> Result<(usize, QualityPredictions), PipelineError> {
        let rows = self.forward_prep.run(&self.bus)?;
        let predictions = self.forward.predict(&self.bus)?;
        Ok((rows, self.forward.current(&predictions)?))
    }

    fn full_cycle(&self) -> Result<CycleReport, PipelineError> {
        let (_, predictions) = self.forward_half()?;

        let targets = self.forward.targets();
        let mut intermediate = Table::new(
            targets.ordered().iter().map(|t| (*t).to_string()).collect(),
        );
        intermediate.push_numeric_row(&[
            predictions.elongation,
            predictions.uts,
            predictions.conductivity,
        ])?;
        self.bus.write(Stage::IntermediateFeatures, &intermediate)?;

        self.reverse_prep.run(&self.bus)?;
        let outcome = self.inverse.predict(&self.bus)?;
        self.bus
            .write(Stage::Recommendation, &Table::from_predictions(&outcome.all_results)?)?;

        let raw = self.bus.read(Stage::RawInput)?;
        let original =
            raw.last_row_values(Stage::RawInput.file_name(), &self.original_value_keys)?;
        let differences = delta::diff(&original, &outcome.last_result)?.differences();

        info!(
            forward_prep = self.forward_prep.name(),
            reverse_prep = self.reverse_prep.name(),
            parameters = differences.len(),
            "Cycle stages complete"
        );

        Ok(CycleReport {
            predictions,
            differences,
            original,
            prediction: outcome.last_result,
            completed_at: Utc::now(),
        })
    }
}

async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
}
