use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::backend::BackendError;

/// Failure taxonomy of the trust signal engine.
///
/// None of these are fatal: every one is recovered by reverting the affected
/// entity to its last authoritative value.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Telemetry is incomplete. Callers show no warning; never surfaced to users.
    #[error("Insufficient telemetry to assess risk")]
    InsufficientData,

    #[error("Network failure: {0}")]
    NetworkFailure(#[from] BackendError),

    /// A write or re-fetch outlived the outer timeout. Handled as a network failure.
    #[error("Write did not settle within {0:?}")]
    StaleWriteTimeout(Duration),
}

impl TrustError {
    /// Short message for the non-blocking notification shown next to a vote control.
    pub fn user_message(&self) -> &'static str {
        match self {
            TrustError::InsufficientData => "Not enough data to assess this page",
            TrustError::NetworkFailure(_) | TrustError::StaleWriteTimeout(_) => {
                "Your vote could not be saved. Please try again."
            }
        }
    }
}

/// Error type of the local HTTP bridge.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Backend(e) => {
                tracing::error!("Backend error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "BACKEND_ERROR",
                    "The remote store could not be reached".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
