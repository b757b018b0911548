//! Line Configuration - operator-tunable TOML values
//!
//! Every struct implements `Default` with values from [`super::defaults`],
//! so a missing file or a partial file behaves like the built-in setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one rod-line deployment.
///
/// Load with `LineConfig::load()` which searches:
/// 1. `$RODLINE_CONFIG` env var
/// 2. `./rodline.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineConfig {
    /// Line identification
    #[serde(default)]
    pub line: LineInfo,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Data directory and staged-artifact locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Model directories and input scaling policy
    #[serde(default)]
    pub models: ModelsConfig,

    /// Window and column layout of the prediction cycle
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Raw snapshot source
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Scheduled cycle settings
    #[serde(default)]
    pub automation: AutomationConfig,
}

impl LineConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("RODLINE_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), line = %config.line.name, "Loaded line config from RODLINE_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from RODLINE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "RODLINE_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("rodline.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(line = %config.line.name, "Loaded line config from ./rodline.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./rodline.toml, using defaults");
                }
            }
        }

        info!("No rodline.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply environment overrides that take precedence over the file.
    ///
    /// `RODLINE_SERVER_ADDR` and `AUTOMATION_INTERVAL_SECS`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("RODLINE_SERVER_ADDR") {
            self.server.addr = addr;
        }
        if let Some(secs) = std::env::var("AUTOMATION_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.automation.interval_secs = secs;
        }
    }

    /// Validate the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.pipeline.window_size == 0 {
            errors.push("pipeline.window_size must be > 0".to_string());
        }
        if self.automation.interval_secs == 0 {
            errors.push("automation.interval_secs must be > 0".to_string());
        }
        if self.automation.job_name.trim().is_empty() {
            errors.push("automation.job_name must not be empty".to_string());
        }
        if self.ingestion.timeout_secs == 0 {
            errors.push("ingestion.timeout_secs must be > 0".to_string());
        }

        let targets = &self.pipeline.quality_targets;
        for (name, value) in [
            ("elongation", &targets.elongation),
            ("uts", &targets.uts),
            ("conductivity", &targets.conductivity),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("pipeline.quality_targets.{name} must not be empty"));
            }
        }

        if self.models.forward_dir.as_os_str().is_empty() {
            errors.push("models.forward_dir must not be empty".to_string());
        }
        if self.models.inverse_dir.as_os_str().is_empty() {
            errors.push("models.inverse_dir must not be empty".to_string());
        }
        if self.paths.staging_dir.as_os_str().is_empty() {
            errors.push("paths.staging_dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Line Info
// ============================================================================

/// Identification metadata; appears in logs only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineInfo {
    #[serde(default = "default_line_name")]
    pub name: String,
}

fn default_line_name() -> String {
    "Unnamed".to_string()
}

impl Default for LineInfo {
    fn default() -> Self {
        Self {
            name: default_line_name(),
        }
    }
}

// ============================================================================
// Server Config
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Overridden by `RODLINE_SERVER_ADDR` or `--addr`.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

// ============================================================================
// Paths Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of process-owned state (lock file, sled database).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding the staged bus artifacts.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// sled database for manually submitted desired values.
    #[serde(default = "default_feature_db")]
    pub feature_db: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DATA_DIR)
}
fn default_staging_dir() -> PathBuf {
    PathBuf::from(defaults::STAGING_DIR)
}
fn default_feature_db() -> PathBuf {
    PathBuf::from(defaults::FEATURE_DB_PATH)
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            staging_dir: default_staging_dir(),
            feature_db: default_feature_db(),
        }
    }
}

// ============================================================================
// Models Config
// ============================================================================

/// How the prediction window is normalized before inference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureScaling {
    /// Fit a fresh min-max scaler on each window.
    #[default]
    Window,
    /// Apply the training-time `input_scaler.json` from the model directory.
    Persisted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Forward (sensor -> quality) model directory.
    #[serde(default = "default_forward_dir")]
    pub forward_dir: PathBuf,

    /// Inverse (quality -> process parameter) model directory.
    #[serde(default = "default_inverse_dir")]
    pub inverse_dir: PathBuf,

    #[serde(default)]
    pub feature_scaling: FeatureScaling,
}

fn default_forward_dir() -> PathBuf {
    PathBuf::from(defaults::FORWARD_MODEL_DIR)
}
fn default_inverse_dir() -> PathBuf {
    PathBuf::from(defaults::INVERSE_MODEL_DIR)
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            forward_dir: default_forward_dir(),
            inverse_dir: default_inverse_dir(),
            feature_scaling: FeatureScaling::default(),
        }
    }
}

// ============================================================================
// Pipeline Config
// ============================================================================

/// Target identifiers of the three quality metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTargets {
    #[serde(default = "default_target_elongation")]
    pub elongation: String,
    #[serde(default = "default_target_uts")]
    pub uts: String,
    #[serde(default = "default_target_conductivity")]
    pub conductivity: String,
}

fn default_target_elongation() -> String {
    defaults::TARGET_ELONGATION.to_string()
}
fn default_target_uts() -> String {
    defaults::TARGET_UTS.to_string()
}
fn default_target_conductivity() -> String {
    defaults::TARGET_CONDUCTIVITY.to_string()
}

impl Default for QualityTargets {
    fn default() -> Self {
        Self {
            elongation: default_target_elongation(),
            uts: default_target_uts(),
            conductivity: default_target_conductivity(),
        }
    }
}

impl QualityTargets {
    /// Identifiers in artifact column order.
    pub fn ordered(&self) -> [&str; 3] {
        [&self.elongation, &self.uts, &self.conductivity]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rows in the active window.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default)]
    pub quality_targets: QualityTargets,

    /// Raw-input columns fed to the forward models.
    ///
    /// Empty selects every column whose values are all numeric.
    #[serde(default)]
    pub feature_columns: Vec<String>,

    /// Process parameters read from the last raw row as the delta baseline.
    #[serde(default = "default_original_value_keys")]
    pub original_value_keys: Vec<String>,
}

fn default_window_size() -> usize {
    defaults::WINDOW_SIZE
}
fn default_original_value_keys() -> Vec<String> {
    defaults::ORIGINAL_VALUE_KEYS
        .iter()
        .map(|k| (*k).to_string())
        .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            quality_targets: QualityTargets::default(),
            feature_columns: Vec::new(),
            original_value_keys: default_original_value_keys(),
        }
    }
}

// ============================================================================
// Ingestion Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Remote CSV export URL.
    #[serde(default)]
    pub source_url: String,

    /// Local CSV to copy instead of fetching (replay / offline mode).
    #[serde(default)]
    pub source_file: Option<PathBuf>,

    #[serde(default = "default_ingestion_timeout")]
    pub timeout_secs: u64,
}

fn default_ingestion_timeout() -> u64 {
    defaults::INGESTION_TIMEOUT_SECS
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            source_file: None,
            timeout_secs: default_ingestion_timeout(),
        }
    }
}

// ============================================================================
// Automation Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_job_name")]
    pub job_name: String,

    /// Enable automation at startup instead of waiting for an operator.
    #[serde(default)]
    pub enabled_on_start: bool,
}

fn default_interval_secs() -> u64 {
    defaults::AUTOMATION_INTERVAL_SECS
}
fn default_job_name() -> String {
    defaults::AUTOMATION_JOB_NAME.to_string()
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            job_name: default_job_name(),
            enabled_on_start: false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
