//! API route definitions
//!
//! - /api/dashboard - forward predictions for the current snapshot
//! - /api/final_prediction - full cycle report
//! - /api/toggle_automation, /api/get_toggle_state - operator toggle
//! - /api/automation/status - cycle counters and last outcome
//! - /api/models/reload - hot-reload model directories
//! - /api/save_features, /api/features - desired-value submissions

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/final_prediction", get(handlers::get_final_prediction))
        .route("/toggle_automation", post(handlers::toggle_automation))
        .route("/get_toggle_state", get(handlers::get_toggle_state))
        .route("/automation/status", get(handlers::get_automation_status))
        .route("/models/reload", post(handlers::reload_models))
        .route("/save_features", post(handlers::save_features))
        .route("/features", get(handlers::list_features))
        .with_state(state)
}

/// Root-level health endpoint.
pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
