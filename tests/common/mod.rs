//! Shared fixture: model directories, a raw snapshot and a wired pipeline.
//!
//! Models are `gblinear` with zero weights, so every prediction equals the
//! bias regardless of the window, and the target scalers are identity
//! (`data_min = 0`, `data_max = 1`).

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rodline::acquisition::FileIngestor;
use rodline::api::ApiState;
use rodline::automation::{AutomationController, IntervalScheduler};
use rodline::config::{FeatureScaling, PipelineConfig};
use rodline::pipeline::{
    CyclePipeline, ForwardPipeline, ForwardProjection, InversePipeline, Preprocessor,
    ReverseProjection,
};
use rodline::registry::ModelRegistry;
use rodline::storage::FeatureStore;
use rodline::{Stage, StagedBus};
use tempfile::TempDir;

pub const FEATURES: [&str; 4] = ["CAST_WHEEL_RPM_VAL0", "BAR_TEMP_VAL0", "TUNDISH_TEMP_VAL0", "pctAL"];
pub const QUALITY: [&str; 3] = ["Elongation", "UTS", "Conductivity"];

pub struct Fixture {
    pub dir: TempDir,
    pub bus: Arc<StagedBus>,
    pub pipeline: Arc<CyclePipeline>,
    pub source_csv: PathBuf,
}

impl Fixture {
    pub fn forward_dir(&self) -> PathBuf {
        self.dir.path().join("models/forward")
    }

    pub fn append_desired(&self, rows: usize) {
        let headers: Vec<String> = QUALITY.iter().map(|s| (*s).to_string()).collect();
        for i in 0..rows {
            self.bus
                .append(Stage::DesiredValues, &headers, &[12.0, 11.0 + i as f64 * 0.1, 61.3])
                .unwrap();
        }
    }

    pub fn controller(&self, interval: Duration) -> Arc<AutomationController> {
        AutomationController::new(
            Arc::new(IntervalScheduler::new()),
            Arc::clone(&self.pipeline) as Arc<dyn rodline::CycleRunner>,
            interval,
            "final_prediction_job",
        )
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            controller: self.controller(Duration::from_secs(10)),
            pipeline: Arc::clone(&self.pipeline),
            bus: Arc::clone(&self.bus),
            feature_store: Some(FeatureStore::temporary().unwrap()),
            quality_targets: Default::default(),
        }
    }
}

pub fn write_linear(dir: &Path, target: &str, bias: f64, width: usize) {
    std::fs::create_dir_all(dir).unwrap();
    let model = serde_json::json!({
        "booster": "gblinear",
        "bias": bias,
        "weights": vec![0.0; width],
    });
    let scaler = serde_json::json!({"data_min": [0.0], "data_max": [1.0]});
    std::fs::write(
        dir.join(format!("xgboost_model_{target}.json")),
        model.to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.join(format!("target_scaler_{target}.json")),
        scaler.to_string(),
    )
    .unwrap();
}

/// `rows` snapshot rows; the last one has `BAR_TEMP_VAL0 = 955`.
pub fn snapshot_csv(rows: usize) -> String {
    let mut csv = format!("timestamp,{}\n", FEATURES.join(","));
    for i in 0..rows {
        let bar_temp = if i + 1 == rows { 955.0 } else { 948.0 + (i % 4) as f64 };
        csv.push_str(&format!(
            "2024-03-01 08:{:02}:00,{},{},{},{}\n",
            i,
            2.0 + (i % 3) as f64 * 0.1,
            bar_temp,
            1120.0 + i as f64,
            99.5
        ));
    }
    csv
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        original_value_keys: vec!["BAR_TEMP_VAL0".to_string(), "pctAL".to_string()],
        ..PipelineConfig::default()
    }
}

/// Forward: 12.3 / 210.5 / 58.9. Inverse: `BAR_TEMP_VAL0 = 950`.
pub fn fixture_with(snapshot_rows: usize, settings: &PipelineConfig) -> Fixture {
    fixture_wrapping(snapshot_rows, settings, |prep| prep)
}

/// Like [`fixture_with`], with `wrap` applied to the forward projection.
pub fn fixture_wrapping(
    snapshot_rows: usize,
    settings: &PipelineConfig,
    wrap: impl FnOnce(Box<dyn Preprocessor>) -> Box<dyn Preprocessor>,
) -> Fixture {
    let dir = tempfile::tempdir().expect("tmpdir");

    let forward_dir = dir.path().join("models/forward");
    write_linear(&forward_dir, "Elongation", 12.3, FEATURES.len());
    write_linear(&forward_dir, "UTS", 210.5, FEATURES.len());
    write_linear(&forward_dir, "Conductivity", 58.9, FEATURES.len());

    let inverse_dir = dir.path().join("models/backward");
    write_linear(&inverse_dir, "BAR_TEMP_VAL0", 950.0, QUALITY.len());

    let source_csv = dir.path().join("export.csv");
    std::fs::write(&source_csv, snapshot_csv(snapshot_rows)).unwrap();

    let bus = Arc::new(StagedBus::new(dir.path().join("staging")));
    let forward = ForwardPipeline::new(
        Arc::new(ModelRegistry::load(&forward_dir).unwrap()),
        settings.window_size,
        FeatureScaling::Window,
        settings.quality_targets.clone(),
    );
    let inverse = InversePipeline::new(
        Arc::new(ModelRegistry::load(&inverse_dir).unwrap()),
        settings.window_size,
        FeatureScaling::Window,
    );
    let pipeline = Arc::new(CyclePipeline::with_preprocessors(
        Arc::clone(&bus),
        Arc::new(FileIngestor::new(&source_csv)),
        wrap(Box::new(ForwardProjection::new(settings.feature_columns.clone()))),
        Box::new(ReverseProjection::new(settings.quality_targets.clone())),
        forward,
        inverse,
        settings.original_value_keys.clone(),
    ));

    Fixture {
        dir,
        bus,
        pipeline,
        source_csv,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(12, &pipeline_config())
}
