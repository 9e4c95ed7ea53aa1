//! Risk level classification: maps a decayed score onto the ordinal
//! `RiskLevel` staircase and answers the single "should this surface warn"
//! comparison every UI surface shares.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ordinal risk bucket. Ordering follows declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Moderate,
    High,
    Severe,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::None,
        RiskLevel::Low,
        RiskLevel::Moderate,
        RiskLevel::High,
        RiskLevel::Severe,
    ];

    pub fn ordinal(self) -> u8 {
        match self {
            RiskLevel::None => 0,
            RiskLevel::Low => 1,
            RiskLevel::Moderate => 2,
            RiskLevel::High => 3,
            RiskLevel::Severe => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Severe => "severe",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RiskLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown risk level '{s}'"))
    }
}

/// Lower bounds (inclusive) of each level above `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub low: f64,
    pub moderate: f64,
    pub high: f64,
    pub severe: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 0.05,
            moderate: 0.25,
            high: 0.5,
            severe: 0.75,
        }
    }
}

impl RiskThresholds {
    /// Builds a threshold set, rejecting cut points that are not strictly
    /// increasing inside `(0, 1]`.
    pub fn new(low: f64, moderate: f64, high: f64, severe: f64) -> Result<Self, String> {
        let cuts = [low, moderate, high, severe];
        if cuts.iter().any(|c| !c.is_finite() || *c <= 0.0 || *c > 1.0) {
            return Err(format!("risk cut points must lie in (0, 1], got {cuts:?}"));
        }
        if cuts.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!("risk cut points must be strictly increasing, got {cuts:?}"));
        }
        Ok(Self {
            low,
            moderate,
            high,
            severe,
        })
    }
}

/// Maps a temporal score onto a risk level. Scores outside `[0, 1]` are
/// clamped; NaN is treated as no risk.
pub fn classify(temporal_score: f64, thresholds: &RiskThresholds) -> RiskLevel {
    if temporal_score.is_nan() {
        return RiskLevel::None;
    }
    match temporal_score.clamp(0.0, 1.0) {
        s if s >= thresholds.severe => RiskLevel::Severe,
        s if s >= thresholds.high => RiskLevel::High,
        s if s >= thresholds.moderate => RiskLevel::Moderate,
        s if s >= thresholds.low => RiskLevel::Low,
        _ => RiskLevel::None,
    }
}

/// `ordinal(current) >= ordinal(threshold)`.
pub fn meets_threshold(current: RiskLevel, threshold: RiskLevel) -> bool {
    current.ordinal() >= threshold.ordinal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_matches_declaration_order() {
        for pair in RiskLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].ordinal() < pair[1].ordinal());
        }
    }

    #[test]
    fn test_classify_cut_points_inclusive() {
        let t = RiskThresholds::default();
        assert_eq!(classify(0.0, &t), RiskLevel::None);
        assert_eq!(classify(0.049, &t), RiskLevel::None);
        assert_eq!(classify(0.05, &t), RiskLevel::Low);
        assert_eq!(classify(0.25, &t), RiskLevel::Moderate);
        assert_eq!(classify(0.5, &t), RiskLevel::High);
        assert_eq!(classify(0.75, &t), RiskLevel::Severe);
        assert_eq!(classify(1.0, &t), RiskLevel::Severe);
    }

    #[test]
    fn test_classify_is_monotonic_without_gaps() {
        let t = RiskThresholds::default();
        let mut previous = RiskLevel::None;
        for i in 0..=1000 {
            let level = classify(i as f64 / 1000.0, &t);
            assert!(level >= previous, "classification dropped at {i}");
            previous = level;
        }
        assert_eq!(previous, RiskLevel::Severe);
    }

    #[test]
    fn test_classify_out_of_range_inputs() {
        let t = RiskThresholds::default();
        assert_eq!(classify(-3.0, &t), RiskLevel::None);
        assert_eq!(classify(7.5, &t), RiskLevel::Severe);
        assert_eq!(classify(f64::NAN, &t), RiskLevel::None);
    }

    #[test]
    fn test_meets_threshold() {
        assert!(meets_threshold(RiskLevel::High, RiskLevel::Moderate));
        assert!(meets_threshold(RiskLevel::Moderate, RiskLevel::Moderate));
        assert!(!meets_threshold(RiskLevel::Low, RiskLevel::Moderate));
        assert!(meets_threshold(RiskLevel::None, RiskLevel::None));
    }

    #[test]
    fn test_thresholds_must_increase() {
        assert!(RiskThresholds::new(0.1, 0.3, 0.6, 0.9).is_ok());
        assert!(RiskThresholds::new(0.1, 0.3, 0.3, 0.9).is_err());
        assert!(RiskThresholds::new(0.0, 0.3, 0.6, 0.9).is_err());
        assert!(RiskThresholds::new(0.1, 0.3, 0.6, 1.5).is_err());
    }

    #[test]
    fn test_risk_level_from_str() {
        assert_eq!("Severe".parse::<RiskLevel>().unwrap(), RiskLevel::Severe);
        assert_eq!(" moderate ".parse::<RiskLevel>().unwrap(), RiskLevel::Moderate);
        assert!("extreme".parse::<RiskLevel>().is_err());
    }
}
