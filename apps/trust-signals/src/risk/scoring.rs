use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TrustError;
use crate::models::telemetry::{FlagReason, FlagTelemetry, ReasonCount};

/// Decay rates for the temporal score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    /// λ1, per hour elapsed since the last flag.
    pub per_hour: f64,
    /// λ2, per clean impression since the last flag.
    pub per_clean_impression: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self::from_half_lives(720.0, 5000.0)
    }
}

impl DecayConfig {
    /// Builds decay rates from half-lives: 30 days (720h) and 5000 clean
    /// impressions by default.
    pub fn from_half_lives(hours: f64, clean_impressions: f64) -> Self {
        Self {
            per_hour: std::f64::consts::LN_2 / hours,
            per_clean_impression: std::f64::consts::LN_2 / clean_impressions,
        }
    }
}

/// Base score: the flag-weight-per-impression ratio, scaled by `ln(1 + flag_count)`
/// so concentrated reports on a small resource weigh more than the same
/// ratio spread over heavy traffic.
///
/// Returns `InsufficientData` unless flag count, cumulative weight and a
/// non-zero impression count are all present.
pub fn compute_base_score(telemetry: &FlagTelemetry) -> Result<f64, TrustError> {
    let (flag_count, weight, impressions) = match (
        telemetry.flag_count,
        telemetry.flags_cumulative_weight,
        telemetry.impressions,
    ) {
        (Some(c), Some(w), Some(i)) if i > 0 && w.is_finite() => (c, w, i),
        _ => return Err(TrustError::InsufficientData),
    };

    let ratio = (weight / impressions as f64).clamp(0.0, 1.0);
    Ok((ratio * (flag_count as f64).ln_1p()).clamp(0.0, 1.0))
}

/// Applies exponential decay over hours since the last flag and clean
/// impressions since the last flag. Never exceeds `base`.
///
/// A missing `last_flag_timestamp` contributes no time decay; a timestamp
/// in the future (clock skew) counts as zero elapsed time.
pub fn compute_temporal_score(
    base: f64,
    telemetry: &FlagTelemetry,
    now: DateTime<Utc>,
    decay: &DecayConfig,
) -> f64 {
    let hours_since = telemetry
        .last_flag_timestamp
        .map(|last| hours_between(last, now))
        .unwrap_or(0.0);
    let clean_impressions = telemetry.impressions_since_last_flag.unwrap_or(0) as f64;

    let factor = (-decay.per_hour * hours_since).exp()
        * (-decay.per_clean_impression * clean_impressions).exp();
    (base.clamp(0.0, 1.0) * factor).clamp(0.0, 1.0)
}

/// Most-reported reason. Ties go to the reason seen first; repeated
/// entries for the same reason are summed.
pub fn top_reason(distribution: &[ReasonCount]) -> Option<FlagReason> {
    let mut totals: Vec<(FlagReason, u64)> = Vec::new();
    for rc in distribution {
        match totals.iter_mut().find(|(reason, _)| *reason == rc.reason) {
            Some((_, total)) => *total += rc.count as u64,
            None => totals.push((rc.reason, rc.count as u64)),
        }
    }

    let mut best: Option<(FlagReason, u64)> = None;
    for (reason, total) in totals {
        if total == 0 {
            continue;
        }
        match best {
            Some((_, best_total)) if best_total >= total => {}
            _ => best = Some((reason, total)),
        }
    }
    best.map(|(reason, _)| reason)
}

fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds();
    (millis as f64 / 3_600_000.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn scenario_a() -> FlagTelemetry {
        FlagTelemetry {
            flag_count: Some(5),
            flags_cumulative_weight: Some(8.0),
            impressions: Some(100),
            first_flag_timestamp: Some(now() - Duration::days(3)),
            last_flag_timestamp: Some(now()),
            impressions_since_last_flag: Some(0),
            flag_distribution: vec![],
        }
    }

    fn rc(reason: FlagReason, count: u32) -> ReasonCount {
        ReasonCount { reason, count }
    }

    #[test]
    fn test_base_score_scenario_a() {
        let base = compute_base_score(&scenario_a()).unwrap();
        let expected = 0.08 * 5.0_f64.ln_1p();
        assert!((base - expected).abs() < 1e-12, "Base was {base}");
        assert!(base > 0.0 && base < 0.2);
    }

    #[test]
    fn test_temporal_equals_base_when_fresh() {
        let telemetry = scenario_a();
        let base = compute_base_score(&telemetry).unwrap();
        let temporal = compute_temporal_score(base, &telemetry, now(), &DecayConfig::default());
        assert!((temporal - base).abs() < 1e-12);
    }

    #[test]
    fn test_clean_impressions_lower_score() {
        let a = scenario_a();
        let b = FlagTelemetry {
            impressions_since_last_flag: Some(10_000),
            ..scenario_a()
        };
        let decay = DecayConfig::default();
        let base = compute_base_score(&a).unwrap();
        let score_a = compute_temporal_score(base, &a, now(), &decay);
        let score_b = compute_temporal_score(base, &b, now(), &decay);
        assert!(score_b < score_a, "{score_b} !< {score_a}");
    }

    #[test]
    fn test_decay_is_monotonic_in_time() {
        let telemetry = scenario_a();
        let decay = DecayConfig::default();
        let mut previous = f64::INFINITY;
        for days in [0, 1, 7, 30, 90, 365, 3650] {
            let score = compute_temporal_score(0.6, &telemetry, now() + Duration::days(days), &decay);
            assert!(score <= previous, "Score rose at {days} days");
            previous = score;
        }
    }

    #[test]
    fn test_decay_is_monotonic_in_clean_impressions() {
        let decay = DecayConfig::default();
        let mut previous = f64::INFINITY;
        for clean in [0_u64, 1, 100, 5_000, 50_000, 5_000_000] {
            let telemetry = FlagTelemetry {
                impressions_since_last_flag: Some(clean),
                ..scenario_a()
            };
            let score = compute_temporal_score(0.6, &telemetry, now(), &decay);
            assert!(score <= previous, "Score rose at {clean} impressions");
            previous = score;
        }
    }

    #[test]
    fn test_half_life_halves_score() {
        let telemetry = scenario_a();
        let score = compute_temporal_score(
            0.8,
            &telemetry,
            now() + Duration::hours(720),
            &DecayConfig::default(),
        );
        assert!((score - 0.4).abs() < 1e-9, "Score was {score}");
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let telemetry = FlagTelemetry {
            last_flag_timestamp: Some(now() + Duration::hours(5)),
            ..scenario_a()
        };
        let score = compute_temporal_score(0.3, &telemetry, now(), &DecayConfig::default());
        assert!((score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_base_score_insufficient_data() {
        let missing_weight = FlagTelemetry {
            flags_cumulative_weight: None,
            ..scenario_a()
        };
        assert!(matches!(
            compute_base_score(&missing_weight),
            Err(TrustError::InsufficientData)
        ));

        let zero_impressions = FlagTelemetry {
            impressions: Some(0),
            ..scenario_a()
        };
        assert!(compute_base_score(&zero_impressions).is_err());
        assert!(compute_base_score(&FlagTelemetry::default()).is_err());
    }

    #[test]
    fn test_base_score_clamped_to_one() {
        let telemetry = FlagTelemetry {
            flag_count: Some(40),
            flags_cumulative_weight: Some(80.0),
            impressions: Some(40),
            ..Default::default()
        };
        assert_eq!(compute_base_score(&telemetry).unwrap(), 1.0);
    }

    #[test]
    fn test_no_flags_scores_zero() {
        let telemetry = FlagTelemetry {
            flag_count: Some(0),
            flags_cumulative_weight: Some(0.0),
            impressions: Some(1_000),
            ..Default::default()
        };
        assert_eq!(compute_base_score(&telemetry).unwrap(), 0.0);
    }

    #[test]
    fn test_top_reason_highest_count() {
        let dist = vec![
            rc(FlagReason::Spam, 2),
            rc(FlagReason::Phishing, 5),
            rc(FlagReason::Scam, 1),
        ];
        assert_eq!(top_reason(&dist), Some(FlagReason::Phishing));
    }

    #[test]
    fn test_top_reason_tie_goes_to_first_seen() {
        let dist = vec![
            rc(FlagReason::Scam, 3),
            rc(FlagReason::Malware, 3),
        ];
        assert_eq!(top_reason(&dist), Some(FlagReason::Scam));
    }

    #[test]
    fn test_top_reason_merges_repeated_reasons() {
        let dist = vec![
            rc(FlagReason::Spam, 2),
            rc(FlagReason::Malware, 3),
            rc(FlagReason::Spam, 2),
        ];
        assert_eq!(top_reason(&dist), Some(FlagReason::Spam));
    }

    #[test]
    fn test_top_reason_empty() {
        assert_eq!(top_reason(&[]), None);
        assert_eq!(top_reason(&[rc(FlagReason::Other, 0)]), None);
    }
}
