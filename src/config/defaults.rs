//! System-wide default constants.
//!
//! Grouped by subsystem. Values mirror the behaviour of the line's
//! original prediction service so a deployment without a config file
//! behaves identically.

// ============================================================================
// Pipeline
// ============================================================================

/// Rows in the active prediction window.
pub const WINDOW_SIZE: usize = 10;

/// Quality target identifiers as they appear in model file names and in
/// the intermediate/desired-values artifacts.
pub const TARGET_ELONGATION: &str = "Elongation";
pub const TARGET_UTS: &str = "UTS";
pub const TARGET_CONDUCTIVITY: &str = "Conductivity";

/// Process parameters compared against the inverse recommendation.
pub const ORIGINAL_VALUE_KEYS: [&str; 18] = [
    "EMUL_OIL_L_TEMP_PV_VAL0",
    "STAND_OIL_L_TEMP_PV_REAL_VAL0",
    "GEAR_OIL_L_TEMP_PV_REAL_VAL0",
    "EMUL_OIL_L_PR_VAL0",
    "QUENCH_CW_FLOW_EXIT_VAL0",
    "CAST_WHEEL_RPM_VAL0",
    "BAR_TEMP_VAL0",
    "QUENCH_CW_FLOW_ENTRY_VAL0",
    "GEAR_OIL_L_PR_VAL0",
    "STANDS_OIL_L_PR_VAL0",
    "TUNDISH_TEMP_VAL0",
    "BATH_TEMP_F7_VAL0",
    "BATH_TEMP_F8_VAL0",
    "RM_MOTOR_COOL_WATER__VAL0",
    "ROLL_MILL_AMPS_VAL0",
    "RM_COOL_WATER_FLOW_VAL0",
    "EMULSION_LEVEL_ANALO_VAL0",
    "pctAL",
];

// ============================================================================
// Model Artifacts
// ============================================================================

/// File name prefix of a trained predictor artifact.
pub const MODEL_FILE_PREFIX: &str = "xgboost_model_";

/// File name prefix of a target-value scaler artifact.
pub const SCALER_FILE_PREFIX: &str = "target_scaler_";

/// Optional training-time input scaler, used with `feature_scaling = "persisted"`.
pub const INPUT_SCALER_FILE: &str = "input_scaler.json";

/// Extension of every model/scaler artifact.
pub const ARTIFACT_EXTENSION: &str = "json";

pub const FORWARD_MODEL_DIR: &str = "ml_models/models/forward";
pub const INVERSE_MODEL_DIR: &str = "ml_models/models/backward";

// ============================================================================
// Storage
// ============================================================================

pub const DATA_DIR: &str = "./data";
pub const STAGING_DIR: &str = "data/processed/uploaded_files";
pub const FEATURE_DB_PATH: &str = "./data/features.db";

// ============================================================================
// Automation
// ============================================================================

/// Name of the single recurring job owned by the automation controller.
pub const AUTOMATION_JOB_NAME: &str = "final_prediction_job";

/// Seconds between scheduled full cycles.
pub const AUTOMATION_INTERVAL_SECS: u64 = 10;

// ============================================================================
// Ingestion
// ============================================================================

/// HTTP client timeout for the remote tabular export (seconds).
pub const INGESTION_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Server
// ============================================================================

pub const SERVER_ADDR: &str = "0.0.0.0:5000";
