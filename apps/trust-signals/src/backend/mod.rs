//! Collaborator contracts for the remote document store and key-value store,
//! plus the viewer's cached threshold preference.
//!
//! The engine only ever talks to these traits. `HttpBackend` is the production
//! implementation; tests substitute in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::telemetry::FlagTelemetry;
use crate::models::vote::{EntityId, VoteType, VoteableEntity};
use crate::risk::classifier::RiskLevel;

pub mod http;

pub use http::HttpBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Retryable failure: {0}")]
    Retryable(String),

    #[error("Terminal failure: {0}")]
    Terminal(String),
}

impl BackendError {
    /// Transport failures, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Http(_) | BackendError::Retryable(_) => true,
            BackendError::Api { status, .. } => *status == 429 || *status >= 500,
            BackendError::Parse(_) | BackendError::NotFound(_) | BackendError::Terminal(_) => false,
        }
    }
}

/// Source of abuse-flag telemetry.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// `Ok(None)` when the resource has never been flagged or observed.
    async fn fetch_flag_telemetry(
        &self,
        resource_key: &str,
    ) -> Result<Option<FlagTelemetry>, BackendError>;
}

/// Vote storage. `commit_vote` must be idempotent: sending the same value
/// twice is a no-op on the backend.
#[async_trait]
pub trait VoteBackend: Send + Sync {
    async fn fetch_voteable_entity(&self, id: &EntityId) -> Result<VoteableEntity, BackendError>;

    async fn fetch_viewer_vote(&self, id: &EntityId) -> Result<VoteType, BackendError>;

    /// Records the viewer's vote and returns the vote the backend actually holds.
    async fn commit_vote(&self, id: &EntityId, vote: VoteType) -> Result<VoteType, BackendError>;
}

/// The viewer's warning threshold. Synchronous: implementations serve a cached value.
pub trait ThresholdPreference: Send + Sync {
    fn threshold(&self) -> RiskLevel;
}

/// Fixed threshold, taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct StaticThreshold(pub RiskLevel);

impl ThresholdPreference for StaticThreshold {
    fn threshold(&self) -> RiskLevel {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::Retryable("x".into()).is_retryable());
        assert!(BackendError::Api {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(BackendError::Api {
            status: 429,
            message: String::new()
        }
        .is_retryable());
        assert!(!BackendError::Api {
            status: 403,
            message: String::new()
        }
        .is_retryable());
        assert!(!BackendError::Terminal("x".into()).is_retryable());
        assert!(!BackendError::NotFound("x".into()).is_retryable());
    }
}
