//! Arbitrage engine limits.

use serde::{Deserialize, Serialize};

/// Validation and feasibility limits for the arbitrage engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageParameters {
    /// Required profit as a fraction of total cost.
    #[serde(default = "default_min_profit_threshold")]
    pub min_profit_threshold: f64,
    /// Maximum VaR as a fraction of total cost.
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade: f64,
    /// Maximum tolerated pairwise leg correlation.
    #[serde(default = "default_max_correlation_risk")]
    pub max_correlation_risk: f64,
    /// Maximum market impact as a fraction of traded value.
    #[serde(default = "default_max_market_impact")]
    pub max_market_impact: f64,
    /// Maximum slippage estimate as a fraction of traded value.
    #[serde(default = "default_max_slippage")]
    pub max_slippage: f64,
    /// Maximum total notional per opportunity, in quote currency.
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    /// Expected maximum holding period in seconds.
    #[serde(default = "default_max_holding_period_secs")]
    pub max_holding_period_secs: u64,
    /// Opposing-side depth required per unit of leg size.
    #[serde(default = "default_min_liquidity_requirement")]
    pub min_liquidity_requirement: f64,
    /// Mispricings below this confidence are not even sized.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_min_profit_threshold() -> f64 {
    0.001
}

fn default_max_risk_per_trade() -> f64 {
    0.02
}

fn default_max_correlation_risk() -> f64 {
    0.7
}

fn default_max_market_impact() -> f64 {
    0.001
}

fn default_max_slippage() -> f64 {
    0.005
}

fn default_max_position_size() -> f64 {
    250_000.0
}

fn default_max_holding_period_secs() -> u64 {
    3600
}

fn default_min_liquidity_requirement() -> f64 {
    1.0
}

fn default_confidence_threshold() -> f64 {
    0.8
}

impl Default for ArbitrageParameters {
    fn default() -> Self {
        Self {
            min_profit_threshold: default_min_profit_threshold(),
            max_risk_per_trade: default_max_risk_per_trade(),
            max_correlation_risk: default_max_correlation_risk(),
            max_market_impact: default_max_market_impact(),
            max_slippage: default_max_slippage(),
            max_position_size: default_max_position_size(),
            max_holding_period_secs: default_max_holding_period_secs(),
            min_liquidity_requirement: default_min_liquidity_requirement(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}
