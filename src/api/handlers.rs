//! HTTP handlers
//!
//! Thin adapters: every handler delegates to the automation controller,
//! the cycle pipeline or the feature store and maps errors through
//! [`ApiError`].

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::envelope::{ApiError, ApiErrorResponse};
use crate::automation::{AutomationController, AutomationStatus};
use crate::bus::{Stage, StagedBus};
use crate::config::QualityTargets;
use crate::delta::ToFinite;
use crate::error::PipelineError;
use crate::pipeline::CyclePipeline;
use crate::storage::{FeatureRecord, FeatureStore};
use crate::types::{CycleReport, DesiredValues, QualityPredictions, ToggleState};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub controller: Arc<AutomationController>,
    pub pipeline: Arc<CyclePipeline>,
    pub bus: Arc<StagedBus>,
    /// `None` when the sled database could not be opened; submissions
    /// still reach the desired-values log.
    pub feature_store: Option<FeatureStore>,
    pub quality_targets: QualityTargets,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Predictions
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub predictions: QualityPredictions,
}

/// GET /api/dashboard - ingest and run the forward half only, serialized
/// with full cycles
pub async fn get_dashboard(
    State(state): State<ApiState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let predictions = state.controller.run_forward_now().await?;
    Ok(Json(DashboardResponse { predictions }))
}

/// GET /api/final_prediction - full cycle, serialized with scheduled runs
pub async fn get_final_prediction(
    State(state): State<ApiState>,
) -> Result<Json<CycleReport>, ApiError> {
    Ok(Json(state.controller.run_now().await?))
}

// ============================================================================
// Automation
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ToggleRequest {
    #[serde(default)]
    pub enabled: bool,
}

/// POST /api/toggle_automation
pub async fn toggle_automation(
    State(state): State<ApiState>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    match state.controller.set_enabled(request.enabled) {
        Ok(toggle) => {
            let word = if toggle.enabled { "enabled" } else { "disabled" };
            Json(MessageResponse {
                message: format!("Automation {word}"),
            })
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// GET /api/get_toggle_state
pub async fn get_toggle_state(State(state): State<ApiState>) -> Json<ToggleState> {
    Json(state.controller.get_state())
}

/// GET /api/automation/status
pub async fn get_automation_status(State(state): State<ApiState>) -> Json<AutomationStatus> {
    Json(state.controller.latest())
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub forward_targets: Vec<String>,
    pub inverse_targets: Vec<String>,
}

/// POST /api/models/reload - rescan both model directories
pub async fn reload_models(
    State(state): State<ApiState>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let pipeline = Arc::clone(&state.pipeline);
    tokio::task::spawn_blocking(move || pipeline.reload_models())
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))??;

    Ok(Json(ReloadResponse {
        forward_targets: state.pipeline.forward().registry().target_ids(),
        inverse_targets: state.pipeline.inverse().registry().target_ids(),
    }))
}

// ============================================================================
// Desired values
// ============================================================================

/// Accepts numbers or numeric strings for each metric.
#[derive(Debug, Deserialize)]
pub struct SaveFeaturesRequest {
    pub elongation: serde_json::Value,
    pub uts: serde_json::Value,
    pub conductivity: serde_json::Value,
}

impl SaveFeaturesRequest {
    fn parse(&self) -> Result<DesiredValues, PipelineError> {
        Ok(DesiredValues {
            elongation: self.elongation.to_finite("elongation")?,
            uts: self.uts.to_finite("uts")?,
            conductivity: self.conductivity.to_finite("conductivity")?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SaveFeaturesResponse {
    pub message: String,
    pub id: Option<u64>,
}

/// POST /api/save_features
pub async fn save_features(
    State(state): State<ApiState>,
    payload: Result<Json<SaveFeaturesRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };
    let values = match request.parse() {
        Ok(v) => v,
        Err(e) => return ApiError::submission(e).into_response(),
    };

    match store_desired(&state, values).await {
        Ok(id) => {
            info!(id = ?id, uts = values.uts, "Desired values saved");
            Json(SaveFeaturesResponse {
                message: "Features saved successfully!".to_string(),
                id,
            })
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn store_desired(state: &ApiState, values: DesiredValues) -> Result<Option<u64>, ApiError> {
    let store = state.feature_store.clone();
    let bus = Arc::clone(&state.bus);
    let headers: Vec<String> = state
        .quality_targets
        .ordered()
        .iter()
        .map(|t| (*t).to_string())
        .collect();

    // The log feeds the reverse projection; a record only exists for rows
    // that reached it.
    let id = tokio::task::spawn_blocking(move || -> Result<Option<u64>, PipelineError> {
        let record = match &store {
            Some(store) => Some(store.insert(&values)?),
            None => None,
        };
        let appended = bus.append(
            Stage::DesiredValues,
            &headers,
            &[values.elongation, values.uts, values.conductivity],
        );
        if let Err(e) = appended {
            if let (Some(store), Some(record)) = (&store, &record) {
                if let Err(undo) = store.remove(record.id) {
                    warn!(id = record.id, error = %undo, "Failed to roll back desired-values record");
                }
            }
            return Err(e);
        }
        Ok(record.map(|r| r.id))
    })
    .await
    .map_err(|e| PipelineError::Task(e.to_string()))??;
    Ok(id)
}

/// GET /api/features - stored submissions, oldest first
pub async fn list_features(State(state): State<ApiState>) -> Json<Vec<FeatureRecord>> {
    Json(
        state
            .feature_store
            .as_ref()
            .map(FeatureStore::list)
            .unwrap_or_default(),
    )
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub automation_enabled: bool,
    pub forward_models: usize,
    pub inverse_models: usize,
}

/// GET /health
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        automation_enabled: state.controller.get_state().enabled,
        forward_models: state.pipeline.forward().registry().len(),
        inverse_models: state.pipeline.inverse().registry().len(),
    })
}
