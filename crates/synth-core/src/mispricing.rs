//! Model and detector output types.
//!
//! `SyntheticPrice` is what a pricing model produces; `MispricingOpportunity`
//! is the typed event a detector emits when observed and model-implied
//! prices diverge significantly.

use crate::error::{CoreError, Result};
use crate::{InstrumentId, Price};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Model-implied price with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticPrice {
    pub theoretical: Price,
    pub bid: Price,
    pub ask: Price,
    /// Input quality in [0, 1].
    pub confidence: f64,
    pub components: Vec<InstrumentId>,
    /// Parallel to `components`; sum is model-specific.
    pub weights: Vec<f64>,
    pub calculated_at: DateTime<Utc>,
}

impl SyntheticPrice {
    pub fn new(
        theoretical: Price,
        bid: Price,
        ask: Price,
        confidence: f64,
        components: Vec<InstrumentId>,
        weights: Vec<f64>,
    ) -> Result<Self> {
        if components.len() != weights.len() {
            return Err(CoreError::ComponentMismatch {
                components: components.len(),
                weights: weights.len(),
            });
        }
        Ok(Self {
            theoretical,
            bid,
            ask,
            confidence: confidence.clamp(0.0, 1.0),
            components,
            weights,
            calculated_at: Utc::now(),
        })
    }
}

/// Detector family that produced a mispricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MispricingKind {
    Statistical,
    Triangular,
    Volatility,
    Basis,
    CrossExchange,
    SpotDerivative,
}

impl fmt::Display for MispricingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Statistical => "statistical",
            Self::Triangular => "triangular",
            Self::Volatility => "volatility",
            Self::Basis => "basis",
            Self::CrossExchange => "cross_exchange",
            Self::SpotDerivative => "spot_derivative",
        };
        write!(f, "{s}")
    }
}

/// Severity buckets over absolute deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Bucket an absolute fractional deviation: >5% critical, >2% high,
    /// >1% medium, else low.
    pub fn from_deviation(deviation: f64) -> Self {
        let d = deviation.abs();
        if d > 0.05 {
            Self::Critical
        } else if d > 0.02 {
            Self::High
        } else if d > 0.01 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// A statistically significant deviation between observed and model price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MispricingOpportunity {
    pub target: InstrumentId,
    pub components: Vec<InstrumentId>,
    pub weights: Vec<f64>,
    pub kind: MispricingKind,
    pub severity: Severity,
    pub observed_price: Price,
    pub theoretical_price: Price,
    /// Signed fractional deviation (observed vs theoretical).
    pub deviation_pct: f64,
    pub z_score: f64,
    pub confidence: f64,
    pub expected_profit: Decimal,
    pub max_loss: Decimal,
    pub value_at_risk: Decimal,
    pub expected_shortfall: Decimal,
    pub detected_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MispricingOpportunity {
    /// Build an opportunity expiring `ttl` after detection.
    ///
    /// The expiry invariant (`expires_at > detected_at`) is enforced by
    /// clamping non-positive ttls to one millisecond.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target: InstrumentId,
        components: Vec<InstrumentId>,
        weights: Vec<f64>,
        kind: MispricingKind,
        observed_price: Price,
        theoretical_price: Price,
        deviation_pct: f64,
        z_score: f64,
        confidence: f64,
        ttl: Duration,
    ) -> Self {
        let detected_at = Utc::now();
        let ttl = if ttl > Duration::zero() {
            ttl
        } else {
            Duration::milliseconds(1)
        };
        Self {
            target,
            components,
            weights,
            kind,
            severity: Severity::from_deviation(deviation_pct),
            observed_price,
            theoretical_price,
            deviation_pct,
            z_score,
            confidence,
            expected_profit: Decimal::ZERO,
            max_loss: Decimal::ZERO,
            value_at_risk: Decimal::ZERO,
            expected_shortfall: Decimal::ZERO,
            detected_at,
            expires_at: detected_at + ttl,
        }
    }

    pub fn with_expected_profit(mut self, profit: Decimal) -> Self {
        self.expected_profit = profit;
        self
    }

    pub fn with_risk(mut self, max_loss: Decimal, var: Decimal, es: Decimal) -> Self {
        self.max_loss = max_loss;
        self.value_at_risk = var;
        self.expected_shortfall = es;
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_component_weight_mismatch() {
        let result = SyntheticPrice::new(
            Price::new(dec!(100)),
            Price::new(dec!(99)),
            Price::new(dec!(101)),
            0.9,
            vec![InstrumentId::from("A"), InstrumentId::from("B")],
            vec![1.0],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_confidence_clamped() {
        let sp = SyntheticPrice::new(
            Price::new(dec!(100)),
            Price::new(dec!(99)),
            Price::new(dec!(101)),
            1.7,
            vec![InstrumentId::from("A")],
            vec![1.0],
        )
        .unwrap();
        assert_eq!(sp.confidence, 1.0);
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(Severity::from_deviation(0.003), Severity::Low);
        assert_eq!(Severity::from_deviation(0.015), Severity::Medium);
        assert_eq!(Severity::from_deviation(-0.03), Severity::High);
        assert_eq!(Severity::from_deviation(0.08), Severity::Critical);
    }

    #[test]
    fn test_severity_monotonic_in_deviation() {
        let devs = [0.0, 0.005, 0.011, 0.021, 0.051, 0.2];
        let severities: Vec<Severity> = devs.iter().map(|d| Severity::from_deviation(*d)).collect();
        for pair in severities.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn test_expiry_invariant() {
        let m = MispricingOpportunity::new(
            InstrumentId::from("BTC-PERP"),
            vec![InstrumentId::from("BTC/USD")],
            vec![1.0],
            MispricingKind::Basis,
            Price::new(dec!(30200)),
            Price::new(dec!(30015)),
            0.0062,
            2.5,
            0.9,
            Duration::zero(),
        );
        assert!(m.expires_at > m.detected_at);
    }
}
