use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::risk::assessment::RiskConfig;
use crate::risk::classifier::{RiskLevel, RiskThresholds};
use crate::risk::scoring::DecayConfig;
use crate::votes::session::VoteTimings;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_url: String,
    pub store_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub vote_timings: VoteTimings,
    pub risk: RiskConfig,
    /// Threshold used when the viewer has not chosen one.
    pub default_threshold: RiskLevel,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let time_half_life = positive_finite(
            "RISK_TIME_HALF_LIFE_HOURS",
            optional_env("RISK_TIME_HALF_LIFE_HOURS", 720.0)?,
        )?;
        let impression_half_life = positive_finite(
            "RISK_IMPRESSION_HALF_LIFE",
            optional_env("RISK_IMPRESSION_HALF_LIFE", 5000.0)?,
        )?;

        let defaults = RiskThresholds::default();
        let thresholds = RiskThresholds::new(
            optional_env("RISK_CUT_LOW", defaults.low)?,
            optional_env("RISK_CUT_MODERATE", defaults.moderate)?,
            optional_env("RISK_CUT_HIGH", defaults.high)?,
            optional_env("RISK_CUT_SEVERE", defaults.severe)?,
        )
        .map_err(|e| anyhow!(e))?;

        Ok(Config {
            store_url: require_env("STORE_URL")?,
            store_api_key: std::env::var("STORE_API_KEY").ok().filter(|k| !k.is_empty()),
            port: optional_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            vote_timings: VoteTimings {
                quiet_period: Duration::from_millis(optional_env("VOTE_QUIET_PERIOD_MS", 5_000)?),
                write_timeout: Duration::from_millis(optional_env("VOTE_WRITE_TIMEOUT_MS", 10_000)?),
            },
            risk: RiskConfig {
                decay: DecayConfig::from_half_lives(time_half_life, impression_half_life),
                thresholds,
            },
            default_threshold: optional_env("RISK_THRESHOLD", RiskLevel::Moderate)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("{key} has invalid value '{raw}': {e}"))
}

fn positive_finite(key: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(anyhow!("{key} must be a positive finite number, got {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_names_variable() {
        let err = parse_value::<u16>("PORT", "eighty").unwrap_err();
        assert!(err.to_string().contains("PORT"), "{err}");
    }

    #[test]
    fn test_parse_risk_level() {
        let level: RiskLevel = parse_value("RISK_THRESHOLD", "High").unwrap();
        assert_eq!(level, RiskLevel::High);
        assert!(parse_value::<RiskLevel>("RISK_THRESHOLD", "loud").is_err());
    }

    #[test]
    fn test_half_life_rejects_nan_and_infinity() {
        for raw in ["NaN", "inf", "-inf", "0", "-3"] {
            let value: f64 = parse_value("RISK_TIME_HALF_LIFE_HOURS", raw).unwrap();
            let err = positive_finite("RISK_TIME_HALF_LIFE_HOURS", value).unwrap_err();
            assert!(err.to_string().contains("RISK_TIME_HALF_LIFE_HOURS"), "{err}");
        }
        assert_eq!(positive_finite("RISK_IMPRESSION_HALF_LIFE", 5000.0).unwrap(), 5000.0);
    }

    #[test]
    fn test_optional_env_default() {
        let value: u64 = optional_env("TRUST_SIGNALS_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
