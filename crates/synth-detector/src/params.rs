//! Shared detection thresholds.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, DetectorResult};

/// Thresholds shared by every detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionParameters {
    /// Minimum absolute fractional deviation (0.005 = 0.5%).
    #[serde(default = "default_min_deviation_threshold")]
    pub min_deviation_threshold: f64,
    /// Minimum absolute z-score.
    #[serde(default = "default_min_z_score")]
    pub min_z_score: f64,
    /// Minimum input confidence.
    #[serde(default = "default_min_confidence_level")]
    pub min_confidence_level: f64,
    /// Quotes wider than this fraction of mid are unreliable inputs.
    #[serde(default = "default_max_spread_ratio")]
    pub max_spread_ratio: f64,
    /// Observations required before a detector may emit.
    #[serde(default = "default_min_observation_window")]
    pub min_observation_window: usize,
    /// Realized-vs-implied volatility gap that triggers the volatility
    /// detector (0.15 = 15 vol points).
    #[serde(default = "default_volatility_threshold")]
    pub volatility_threshold: f64,
    /// Minimum top-of-book size, in base units, for liquidity-sensitive
    /// detectors.
    #[serde(default = "default_liquidity_threshold")]
    pub liquidity_threshold: Decimal,
    /// Lifetime of an emitted opportunity.
    #[serde(default = "default_max_opportunity_duration_secs")]
    pub max_opportunity_duration_secs: u64,
}

fn default_min_deviation_threshold() -> f64 {
    0.005
}

fn default_min_z_score() -> f64 {
    2.0
}

fn default_min_confidence_level() -> f64 {
    0.8
}

fn default_max_spread_ratio() -> f64 {
    0.02
}

fn default_min_observation_window() -> usize {
    50
}

fn default_volatility_threshold() -> f64 {
    0.15
}

fn default_liquidity_threshold() -> Decimal {
    Decimal::from(1000)
}

fn default_max_opportunity_duration_secs() -> u64 {
    30 * 60
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            min_deviation_threshold: default_min_deviation_threshold(),
            min_z_score: default_min_z_score(),
            min_confidence_level: default_min_confidence_level(),
            max_spread_ratio: default_max_spread_ratio(),
            min_observation_window: default_min_observation_window(),
            volatility_threshold: default_volatility_threshold(),
            liquidity_threshold: default_liquidity_threshold(),
            max_opportunity_duration_secs: default_max_opportunity_duration_secs(),
        }
    }
}

impl DetectionParameters {
    pub fn validate(&self) -> DetectorResult<()> {
        if self.min_deviation_threshold <= 0.0 {
            return Err(DetectorError::Config(
                "min_deviation_threshold must be positive".into(),
            ));
        }
        if self.min_z_score < 0.0 {
            return Err(DetectorError::Config(
                "min_z_score must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence_level) {
            return Err(DetectorError::Config(
                "min_confidence_level must be within [0, 1]".into(),
            ));
        }
        if self.min_observation_window < 2 {
            return Err(DetectorError::Config(
                "min_observation_window must be at least 2".into(),
            ));
        }
        if self.max_opportunity_duration_secs == 0 {
            return Err(DetectorError::Config(
                "max_opportunity_duration_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Opportunity lifetime as a chrono duration.
    pub fn opportunity_ttl(&self) -> Duration {
        Duration::seconds(self.max_opportunity_duration_secs as i64)
    }

    /// Bounded queue capacity for per-detector histories.
    pub fn history_capacity(&self) -> usize {
        2 * self.min_observation_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let p = DetectionParameters::default();
        assert_eq!(p.min_deviation_threshold, 0.005);
        assert_eq!(p.min_z_score, 2.0);
        assert_eq!(p.min_confidence_level, 0.8);
        assert_eq!(p.max_spread_ratio, 0.02);
        assert_eq!(p.min_observation_window, 50);
        assert_eq!(p.volatility_threshold, 0.15);
        assert_eq!(p.liquidity_threshold, Decimal::from(1000));
        assert_eq!(p.max_opportunity_duration_secs, 1800);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut p = DetectionParameters::default();
        p.min_deviation_threshold = 0.0;
        assert!(p.validate().is_err());

        let mut p = DetectionParameters::default();
        p.min_confidence_level = 1.5;
        assert!(p.validate().is_err());

        let mut p = DetectionParameters::default();
        p.min_observation_window = 1;
        assert!(p.validate().is_err());
    }
}
