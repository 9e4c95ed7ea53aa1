use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TrustError;
use crate::models::telemetry::{FlagReason, FlagTelemetry};
use crate::risk::classifier::{classify, meets_threshold, RiskLevel, RiskThresholds};
use crate::risk::scoring::{compute_base_score, compute_temporal_score, top_reason, DecayConfig};

/// Scoring parameters shared by every assessment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub decay: DecayConfig,
    pub thresholds: RiskThresholds,
}

/// Derived risk of one resource. Never persisted; recomputed per fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub base_score: f64,
    pub temporal_score: f64,
    pub level: RiskLevel,
    pub top_reason: Option<FlagReason>,
    /// False when telemetry was insufficient; level is then `None`.
    pub assessed: bool,
}

impl RiskAssessment {
    pub fn unassessed() -> Self {
        Self {
            base_score: 0.0,
            temporal_score: 0.0,
            level: RiskLevel::None,
            top_reason: None,
            assessed: false,
        }
    }
}

/// Scores, decays and classifies a telemetry snapshot.
/// Insufficient telemetry yields `RiskAssessment::unassessed()`.
pub fn assess_risk(telemetry: &FlagTelemetry, now: DateTime<Utc>, config: &RiskConfig) -> RiskAssessment {
    let base_score = match compute_base_score(telemetry) {
        Ok(base) => base,
        Err(TrustError::InsufficientData) => return RiskAssessment::unassessed(),
        Err(e) => {
            tracing::warn!("Unexpected scoring failure: {e}");
            return RiskAssessment::unassessed();
        }
    };
    let temporal_score = compute_temporal_score(base_score, telemetry, now, &config.decay);

    RiskAssessment {
        base_score,
        temporal_score,
        level: classify(temporal_score, &config.thresholds),
        top_reason: top_reason(&telemetry.flag_distribution),
        assessed: true,
    }
}

/// The one predicate every surface uses to decide whether to render a warning.
pub fn should_warn(assessment: &RiskAssessment, threshold: RiskLevel) -> bool {
    assessment.assessed
        && assessment.level > RiskLevel::None
        && meets_threshold(assessment.level, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::telemetry::ReasonCount;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn telemetry(clean_impressions: u64) -> FlagTelemetry {
        FlagTelemetry {
            flag_count: Some(5),
            flags_cumulative_weight: Some(8.0),
            impressions: Some(100),
            first_flag_timestamp: Some(now()),
            last_flag_timestamp: Some(now()),
            impressions_since_last_flag: Some(clean_impressions),
            flag_distribution: vec![ReasonCount {
                reason: FlagReason::Phishing,
                count: 5,
            }],
        }
    }

    #[test]
    fn test_scenario_a_fresh_flags() {
        let a = assess_risk(&telemetry(0), now(), &RiskConfig::default());
        assert!(a.assessed);
        assert_eq!(a.temporal_score, a.base_score);
        assert_eq!(a.level, RiskLevel::Low);
        assert_eq!(a.top_reason, Some(FlagReason::Phishing));
    }

    #[test]
    fn test_scenario_b_clean_impressions_downgrade_level() {
        let config = RiskConfig::default();
        let a = assess_risk(&telemetry(0), now(), &config);
        let b = assess_risk(&telemetry(10_000), now(), &config);
        assert!(b.temporal_score < a.temporal_score);
        assert!(b.temporal_score < config.thresholds.low);
        assert!(b.level < a.level);
        assert_eq!(b.level, RiskLevel::None);
    }

    #[test]
    fn test_insufficient_data_is_unassessed() {
        let a = assess_risk(&FlagTelemetry::default(), now(), &RiskConfig::default());
        assert_eq!(a, RiskAssessment::unassessed());
        assert!(!should_warn(&a, RiskLevel::None));
    }

    #[test]
    fn test_should_warn_respects_threshold() {
        let mut a = assess_risk(&telemetry(0), now(), &RiskConfig::default());
        a.level = RiskLevel::High;
        assert!(should_warn(&a, RiskLevel::Moderate));
        assert!(should_warn(&a, RiskLevel::High));
        assert!(!should_warn(&a, RiskLevel::Severe));
    }

    #[test]
    fn test_no_warning_for_no_risk_even_at_lowest_threshold() {
        let a = assess_risk(&telemetry(10_000), now(), &RiskConfig::default());
        assert_eq!(a.level, RiskLevel::None);
        assert!(!should_warn(&a, RiskLevel::None));
    }
}
