//! Model Registry
//!
//! Discovers (model, target-scaler) pairs in a model directory and keys
//! them by target identifier:
//!
//! ```text
//! xgboost_model_<TARGET>.json   trained predictor
//! target_scaler_<TARGET>.json   scaler of the target values
//! input_scaler.json             optional training-time feature scaler
//! ```
//!
//! A model without its scaler (or the reverse) fails the whole load. The
//! loaded set is immutable; `reload()` builds a fresh set and swaps it in
//! with one atomic store, so readers see either the old or the new set.

pub mod model;
pub mod scaler;

pub use model::{LinearModel, ModelArtifact, Predictor, Tree, TreeEnsemble, TreeNode};
pub use scaler::MinMaxScaler;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::defaults::{
    ARTIFACT_EXTENSION, INPUT_SCALER_FILE, MODEL_FILE_PREFIX, SCALER_FILE_PREFIX,
};
use crate::error::PipelineError;
use crate::types::FeatureMatrix;

/// One target's model and the scaler that maps its output to real units.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub target_id: String,
    pub model: Arc<dyn Predictor>,
    pub target_scaler: Arc<MinMaxScaler>,
}

impl RegistryEntry {
    pub fn new(
        target_id: impl Into<String>,
        model: Arc<dyn Predictor>,
        target_scaler: MinMaxScaler,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            model,
            target_scaler: Arc::new(target_scaler),
        }
    }

    /// Run the model on a scaled window and return values in original units.
    pub fn predict(&self, window: &FeatureMatrix) -> Result<Vec<f64>, PipelineError> {
        let scaled = self.model.predict(&self.target_id, window)?;
        if scaled.len() != window.len() {
            return Err(PipelineError::PredictionShape {
                target: self.target_id.clone(),
                expected: window.len(),
                actual: scaled.len(),
            });
        }
        self.target_scaler
            .inverse_transform_column(&self.target_id, &scaled)
    }
}

/// An immutable, fully-loaded set of entries.
#[derive(Debug)]
pub struct RegistrySet {
    entries: BTreeMap<String, RegistryEntry>,
    input_scaler: Option<MinMaxScaler>,
    loaded_at: DateTime<Utc>,
}

impl RegistrySet {
    pub fn new(entries: Vec<RegistryEntry>, input_scaler: Option<MinMaxScaler>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.target_id.clone(), e))
                .collect(),
            input_scaler,
            loaded_at: Utc::now(),
        }
    }

    pub fn get(&self, target_id: &str) -> Result<&RegistryEntry, PipelineError> {
        self.entries
            .get(target_id)
            .ok_or_else(|| PipelineError::UnknownTarget(target_id.to_string()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn target_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn input_scaler(&self) -> Option<&MinMaxScaler> {
        self.input_scaler.as_ref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hot-reloadable registry bound to one model directory.
pub struct ModelRegistry {
    dir: PathBuf,
    current: ArcSwap<RegistrySet>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("dir", &self.dir)
            .field("targets", &self.current.load().target_ids())
            .finish()
    }
}

impl ModelRegistry {
    /// Scan `dir` and load every model/scaler pair.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        let set = scan(&dir)?;
        Ok(Self {
            dir,
            current: ArcSwap::from_pointee(set),
        })
    }

    /// Registry over an in-memory set. `reload()` rescans `dir`.
    pub fn from_set(dir: impl Into<PathBuf>, set: RegistrySet) -> Self {
        Self {
            dir: dir.into(),
            current: ArcSwap::from_pointee(set),
        }
    }

    /// Rescan the directory and swap in the new set.
    ///
    /// On failure the previous set stays active.
    pub fn reload(&self) -> Result<usize, PipelineError> {
        let set = self.rescan()?;
        Ok(self.install(set))
    }

    /// Scan the directory without touching the active set.
    pub fn rescan(&self) -> Result<RegistrySet, PipelineError> {
        scan(&self.dir).map_err(|e| {
            warn!(dir = %self.dir.display(), error = %e, "Model registry reload failed, keeping previous set");
            e
        })
    }

    /// Swap in a set produced by [`rescan`](Self::rescan).
    pub fn install(&self, set: RegistrySet) -> usize {
        let count = set.len();
        self.current.store(Arc::new(set));
        info!(dir = %self.dir.display(), targets = count, "Model registry reloaded");
        count
    }

    pub fn get(&self, target_id: &str) -> Result<RegistryEntry, PipelineError> {
        self.current.load().get(target_id).cloned()
    }

    /// The set visible right now. Hold it for the duration of one prediction
    /// so a concurrent reload cannot mix two sets.
    pub fn snapshot(&self) -> Arc<RegistrySet> {
        self.current.load_full()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    pub fn target_ids(&self) -> Vec<String> {
        self.current.load().target_ids()
    }
}

// ============================================================================
// Directory scan
// ============================================================================

fn scan(dir: &Path) -> Result<RegistrySet, PipelineError> {
    let listing = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::registry(dir, format!("cannot read directory: {e}")))?;

    let mut models: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut scalers: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut input_scaler_path = None;

    for entry in listing {
        let path = entry
            .map_err(|e| PipelineError::registry(dir, e.to_string()))?
            .path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
            continue;
        }
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();

        if file_name == INPUT_SCALER_FILE {
            input_scaler_path = Some(path.clone());
        } else if let Some(target) = stem.strip_prefix(MODEL_FILE_PREFIX) {
            insert_target(dir, &mut models, target, path.clone())?;
        } else if let Some(target) = stem.strip_prefix(SCALER_FILE_PREFIX) {
            insert_target(dir, &mut scalers, target, path.clone())?;
        } else {
            debug!(file = %path.display(), "Ignoring unrecognised model artifact");
        }
    }

    let orphan_models: Vec<&str> = models
        .keys()
        .filter(|k| !scalers.contains_key(*k))
        .map(String::as_str)
        .collect();
    let orphan_scalers: Vec<&str> = scalers
        .keys()
        .filter(|k| !models.contains_key(*k))
        .map(String::as_str)
        .collect();
    if !orphan_models.is_empty() || !orphan_scalers.is_empty() {
        return Err(PipelineError::registry(
            dir,
            format!(
                "unpaired artifacts: models without scaler {orphan_models:?}, scalers without model {orphan_scalers:?}"
            ),
        ));
    }
    if models.is_empty() {
        return Err(PipelineError::registry(dir, "no model/scaler pairs found"));
    }

    let mut entries = Vec::with_capacity(models.len());
    for (target, model_path) in &models {
        let model = read_model(dir, model_path)?;
        let scaler = read_scaler(dir, &scalers[target])?;
        info!(target_id = %target, kind = model.kind(), "Loaded model");
        entries.push(RegistryEntry::new(target.clone(), Arc::new(model), scaler));
    }

    let input_scaler = input_scaler_path
        .map(|p| read_scaler(dir, &p))
        .transpose()?;

    Ok(RegistrySet::new(entries, input_scaler))
}

fn insert_target(
    dir: &Path,
    map: &mut BTreeMap<String, PathBuf>,
    target: &str,
    path: PathBuf,
) -> Result<(), PipelineError> {
    if target.is_empty() {
        return Err(PipelineError::registry(
            dir,
            format!("{} has no target identifier", path.display()),
        ));
    }
    map.insert(target.to_string(), path);
    Ok(())
}

fn read_model(dir: &Path, path: &Path) -> Result<ModelArtifact, PipelineError> {
    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::registry(dir, format!("{}: {e}", path.display())))?;
    ModelArtifact::from_json(&bytes)
        .map_err(|e| PipelineError::registry(dir, format!("{}: {e}", path.display())))
}

fn read_scaler(dir: &Path, path: &Path) -> Result<MinMaxScaler, PipelineError> {
    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::registry(dir, format!("{}: {e}", path.display())))?;
    let scaler: MinMaxScaler = serde_json::from_slice(&bytes)
        .map_err(|e| PipelineError::registry(dir, format!("{}: {e}", path.display())))?;
    scaler
        .validate()
        .map_err(|e| PipelineError::registry(dir, format!("{}: {e}", path.display())))?;
    Ok(scaler)
}
