use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a reporter flagged a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    Spam,
    Misleading,
    Harassment,
    Explicit,
    Scam,
    Phishing,
    Malware,
    /// Also catches reasons this build does not know yet.
    #[serde(other)]
    Other,
}

impl FlagReason {
    /// Severity weight of a single flag with this reason.
    /// The store sums these into `flags_cumulative_weight`.
    pub fn severity(self) -> f64 {
        match self {
            FlagReason::Spam => 0.5,
            FlagReason::Misleading => 1.0,
            FlagReason::Harassment => 1.2,
            FlagReason::Explicit => 1.2,
            FlagReason::Scam => 1.8,
            FlagReason::Phishing => 2.0,
            FlagReason::Malware => 2.0,
            FlagReason::Other => 0.5,
        }
    }
}

/// One bucket of the per-reason flag distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub reason: FlagReason,
    pub count: u32,
}

/// Abuse-flag telemetry for one monitored resource (usually a URL).
///
/// Every field is optional on the wire: the store omits counters that were
/// never written. Partial telemetry is valid input; scoring reports it as
/// insufficient data instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagTelemetry {
    /// Distinct reporters.
    pub flag_count: Option<u32>,
    pub flags_cumulative_weight: Option<f64>,
    pub impressions: Option<u64>,
    pub first_flag_timestamp: Option<DateTime<Utc>>,
    pub last_flag_timestamp: Option<DateTime<Utc>>,
    pub impressions_since_last_flag: Option<u64>,
    /// Order is the order the store first saw each reason.
    pub flag_distribution: Vec<ReasonCount>,
}

impl FlagTelemetry {
    /// Recomputes the cumulative weight from the distribution, for stores
    /// that only keep per-reason counters.
    pub fn weight_from_distribution(&self) -> Option<f64> {
        if self.flag_distribution.is_empty() {
            return None;
        }
        Some(
            self.flag_distribution
                .iter()
                .map(|rc| rc.reason.severity() * rc.count as f64)
                .sum(),
        )
    }

    /// Fills in `flags_cumulative_weight` from the distribution when the
    /// store did not report it. A reported weight is never overwritten.
    pub fn with_derived_weight(mut self) -> Self {
        if self.flags_cumulative_weight.is_none() {
            self.flags_cumulative_weight = self.weight_from_distribution();
        }
        self
    }
}
