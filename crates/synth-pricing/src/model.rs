//! The shared pricing-model contract.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use synth_core::{InstrumentId, MarketSnapshot, SyntheticPrice};

use crate::error::ModelResult;

/// Parameters shared across pricing models.
///
/// Individual models read the subset they care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Annualized risk-free rate.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Annualized dividend/borrow yield.
    #[serde(default)]
    pub dividend_yield: f64,
    /// Rolling history window (observations).
    #[serde(default = "default_lookback_period")]
    pub lookback_period: usize,
    /// Bollinger band width in standard deviations.
    #[serde(default = "default_bollinger_k")]
    pub bollinger_k: f64,
    /// Funding rate assumed when none has been observed (1 bp).
    #[serde(default = "default_funding_rate")]
    pub default_funding_rate: Decimal,
    /// Component freshness budget for confidence scoring.
    #[serde(default = "default_staleness_budget_ms")]
    pub staleness_budget_ms: u64,
    /// Component spread ratio beyond which confidence decays.
    #[serde(default = "default_max_spread_ratio")]
    pub max_spread_ratio: f64,
}

fn default_risk_free_rate() -> f64 {
    0.05
}

fn default_lookback_period() -> usize {
    50
}

fn default_bollinger_k() -> f64 {
    2.0
}

fn default_funding_rate() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_staleness_budget_ms() -> u64 {
    500
}

fn default_max_spread_ratio() -> f64 {
    0.02
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            dividend_yield: 0.0,
            lookback_period: default_lookback_period(),
            bollinger_k: default_bollinger_k(),
            default_funding_rate: default_funding_rate(),
            staleness_budget_ms: default_staleness_budget_ms(),
            max_spread_ratio: default_max_spread_ratio(),
        }
    }
}

/// Contract implemented by every pricing model.
///
/// `ingest` is parameter ingestion only (funding tables, surfaces, price
/// histories); it never emits anything. `synthetic_price` is pure with
/// respect to the snapshot.
pub trait PricingModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Absorb snapshot-derived parameters (no opportunity emission).
    fn ingest(&mut self, snapshot: &MarketSnapshot);

    /// Model-implied price of `target` from `components` under `snapshot`.
    fn synthetic_price(
        &self,
        target: &InstrumentId,
        components: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> ModelResult<SyntheticPrice>;

    /// Component weights for a set of instruments.
    ///
    /// The default is an equal-weight allocation summing to 1.
    fn weights(
        &self,
        instruments: &[InstrumentId],
        _snapshot: &MarketSnapshot,
    ) -> ModelResult<Vec<f64>> {
        if instruments.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![1.0 / instruments.len() as f64; instruments.len()])
    }

    /// Pairwise correlation from the model's own history, in [-1, 1].
    fn correlation(&self, a: &InstrumentId, b: &InstrumentId) -> Option<f64>;

    fn update_parameters(&mut self, params: ModelParameters);
}
