use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::telemetry::FlagTelemetry;
use crate::risk::assessment::assess_risk;
use crate::risk::classifier::RiskLevel;
use crate::risk::monitor::RiskVerdict;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AssessRequest {
    pub telemetry: FlagTelemetry,
    /// Defaults to the current time.
    pub now: Option<DateTime<Utc>>,
    /// Defaults to the configured viewer preference.
    pub threshold: Option<RiskLevel>,
}

/// POST /api/v1/risk/assess
pub async fn handle_assess(
    State(state): State<AppState>,
    Json(req): Json<AssessRequest>,
) -> Result<Json<RiskVerdict>, AppError> {
    let now = req.now.unwrap_or_else(Utc::now);
    let assessment = assess_risk(&req.telemetry, now, state.risk.config());
    let threshold = req.threshold.unwrap_or_else(|| state.risk.threshold());
    Ok(Json(state.risk.verdict(assessment, threshold)))
}

/// GET /api/v1/risk/:resource_key
pub async fn handle_check_resource(
    State(state): State<AppState>,
    Path(resource_key): Path<String>,
) -> Result<Json<RiskVerdict>, AppError> {
    if resource_key.trim().is_empty() {
        return Err(AppError::Validation("resource key must not be empty".to_string()));
    }
    Ok(Json(state.risk.check(&resource_key, Utc::now()).await))
}
