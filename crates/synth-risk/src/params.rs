//! Portfolio risk limits.

use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};

/// Portfolio-level risk limits and sizing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Maximum single-position notional as a fraction of portfolio value.
    #[serde(default = "default_max_position_size_percentage")]
    pub max_position_size_percentage: f64,
    /// Maximum portfolio VaR as a fraction of portfolio value.
    #[serde(default = "default_max_portfolio_var")]
    pub max_portfolio_var: f64,
    /// Maximum per-position VaR as a fraction of portfolio value.
    #[serde(default = "default_max_individual_var")]
    pub max_individual_var: f64,
    /// Maximum tolerated pairwise correlation exposure.
    #[serde(default = "default_max_correlation_risk")]
    pub max_correlation_risk: f64,
    /// Maximum gross leverage.
    #[serde(default = "default_max_leverage")]
    pub max_leverage: f64,
    /// Margin requirement multiplier over exchange minimums.
    #[serde(default = "default_margin_requirement_multiplier")]
    pub margin_requirement_multiplier: f64,
    /// Stop-loss distance as a fraction of entry.
    #[serde(default = "default_stop_loss_percentage")]
    pub stop_loss_percentage: f64,
    /// Take-profit distance as a fraction of entry.
    #[serde(default = "default_take_profit_percentage")]
    pub take_profit_percentage: f64,
    /// Peak-to-trough drawdown that triggers emergency reduction.
    #[serde(default = "default_max_drawdown_threshold")]
    pub max_drawdown_threshold: f64,
    /// Fraction of top-of-book liquidity a position may consume.
    #[serde(default = "default_liquidity_requirement")]
    pub liquidity_requirement: f64,
}

fn default_max_position_size_percentage() -> f64 {
    0.05
}

fn default_max_portfolio_var() -> f64 {
    0.02
}

fn default_max_individual_var() -> f64 {
    0.01
}

fn default_max_correlation_risk() -> f64 {
    0.3
}

fn default_max_leverage() -> f64 {
    3.0
}

fn default_margin_requirement_multiplier() -> f64 {
    1.2
}

fn default_stop_loss_percentage() -> f64 {
    0.05
}

fn default_take_profit_percentage() -> f64 {
    0.15
}

fn default_max_drawdown_threshold() -> f64 {
    0.1
}

fn default_liquidity_requirement() -> f64 {
    0.8
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_position_size_percentage: default_max_position_size_percentage(),
            max_portfolio_var: default_max_portfolio_var(),
            max_individual_var: default_max_individual_var(),
            max_correlation_risk: default_max_correlation_risk(),
            max_leverage: default_max_leverage(),
            margin_requirement_multiplier: default_margin_requirement_multiplier(),
            stop_loss_percentage: default_stop_loss_percentage(),
            take_profit_percentage: default_take_profit_percentage(),
            max_drawdown_threshold: default_max_drawdown_threshold(),
            liquidity_requirement: default_liquidity_requirement(),
        }
    }
}

impl RiskParameters {
    pub fn validate(&self) -> RiskResult<()> {
        for (name, value) in [
            (
                "max_position_size_percentage",
                self.max_position_size_percentage,
            ),
            ("max_portfolio_var", self.max_portfolio_var),
            ("max_individual_var", self.max_individual_var),
            ("max_correlation_risk", self.max_correlation_risk),
            ("max_drawdown_threshold", self.max_drawdown_threshold),
            ("liquidity_requirement", self.liquidity_requirement),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RiskError::Config(format!("{name} must be within [0, 1]")));
            }
        }
        if self.max_leverage < 1.0 {
            return Err(RiskError::Config("max_leverage must be at least 1".into()));
        }
        if self.margin_requirement_multiplier < 1.0 {
            return Err(RiskError::Config(
                "margin_requirement_multiplier must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let p = RiskParameters::default();
        assert_eq!(p.max_position_size_percentage, 0.05);
        assert_eq!(p.max_portfolio_var, 0.02);
        assert_eq!(p.max_individual_var, 0.01);
        assert_eq!(p.max_correlation_risk, 0.3);
        assert_eq!(p.max_leverage, 3.0);
        assert_eq!(p.margin_requirement_multiplier, 1.2);
        assert_eq!(p.stop_loss_percentage, 0.05);
        assert_eq!(p.take_profit_percentage, 0.15);
        assert_eq!(p.max_drawdown_threshold, 0.1);
        assert_eq!(p.liquidity_requirement, 0.8);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut p = RiskParameters::default();
        p.max_leverage = 0.5;
        assert!(p.validate().is_err());

        let mut p = RiskParameters::default();
        p.max_portfolio_var = 1.5;
        assert!(p.validate().is_err());
    }
}
