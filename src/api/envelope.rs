//! Error envelope shared by every endpoint.
//!
//! Success bodies are the bare payload; failures are always
//! `{ "error": { "code": "...", "message": "..." }, "meta": { ... } }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

use crate::automation::SchedulerError;
use crate::error::PipelineError;

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    pub service: &'static str,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            service: "rodline",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl ApiErrorResponse {
    pub fn build(status: StatusCode, code: &str, msg: impl Into<String>) -> Response {
        let body = Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: msg.into(),
            },
            meta: ResponseMeta::default(),
        };
        (status, axum::Json(body)).into_response()
    }

    pub fn bad_request(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
    }
}

/// A pipeline failure on its way to the client.
#[derive(Debug)]
pub struct ApiError {
    source: PipelineError,
    /// The request body itself was at fault.
    client_input: bool,
}

impl ApiError {
    /// Conversion and key errors caused by a submitted body.
    pub fn submission(source: PipelineError) -> Self {
        Self {
            source,
            client_input: true,
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.source {
            PipelineError::UpstreamNotReady(_) | PipelineError::InsufficientData { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::UnknownTarget(_) => StatusCode::NOT_FOUND,
            PipelineError::TypeConversion { .. } | PipelineError::KeyMismatch(_)
                if self.client_input =>
            {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(source: PipelineError) -> Self {
        Self {
            source,
            client_input: false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(code = self.source.code(), error = %self.source, "Request failed");
        }
        ApiErrorResponse::build(status, self.source.code(), self.source.to_string())
    }
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        ApiErrorResponse::build(StatusCode::INTERNAL_SERVER_ERROR, "SCHEDULER", self.to_string())
    }
}
