use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{TelemetrySource, ThresholdPreference};
use crate::risk::assessment::{assess_risk, should_warn, RiskAssessment, RiskConfig};
use crate::risk::classifier::RiskLevel;

/// Outcome of checking one resource against the viewer's threshold.
#[derive(Debug, Clone, Serialize)]
pub struct RiskVerdict {
    pub assessment: RiskAssessment,
    pub threshold: RiskLevel,
    pub warn: bool,
}

/// Fetches telemetry for a resource and decides whether to warn.
///
/// Fetch failures and missing telemetry degrade to an unassessed verdict
/// with no warning; they never propagate to the caller.
#[derive(Clone)]
pub struct RiskMonitor {
    source: Arc<dyn TelemetrySource>,
    preference: Arc<dyn ThresholdPreference>,
    config: RiskConfig,
}

impl RiskMonitor {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        preference: Arc<dyn ThresholdPreference>,
        config: RiskConfig,
    ) -> Self {
        Self {
            source,
            preference,
            config,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn threshold(&self) -> RiskLevel {
        self.preference.threshold()
    }

    pub async fn check(&self, resource_key: &str, now: DateTime<Utc>) -> RiskVerdict {
        let assessment = match self.source.fetch_flag_telemetry(resource_key).await {
            Ok(Some(telemetry)) => assess_risk(&telemetry, now, &self.config),
            Ok(None) => {
                debug!("No telemetry for {resource_key}");
                RiskAssessment::unassessed()
            }
            Err(e) => {
                warn!("Telemetry fetch for {resource_key} failed: {e}");
                RiskAssessment::unassessed()
            }
        };
        self.verdict(assessment, self.threshold())
    }

    pub fn verdict(&self, assessment: RiskAssessment, threshold: RiskLevel) -> RiskVerdict {
        let warn = should_warn(&assessment, threshold);
        RiskVerdict {
            assessment,
            threshold,
            warn,
        }
    }
}
