//! Position sizing.
//!
//! The final size is the minimum over four candidates — Kelly,
//! VaR-bounded, volatility-targeted, and (for multi-leg packages) the
//! risk-parity share of the package — followed by a leverage cap and a
//! correlation scale-down. Candidates that cannot be computed from the
//! available inputs simply do not constrain: single-leg trades carry no
//! leg vols, so their parity candidate is absent by construction.

use tracing::debug;

use crate::params::RiskParameters;

/// Hard ceiling on the Kelly fraction.
const KELLY_CAP: f64 = 0.25;

/// Inputs for one sizing decision.
#[derive(Debug, Clone)]
pub struct SizingInputs {
    /// Current portfolio value in quote currency.
    pub portfolio_value: f64,
    /// Entry price per unit.
    pub entry_price: f64,
    /// Estimated probability the trade wins.
    pub win_probability: f64,
    /// Payoff ratio (average win over average loss).
    pub win_loss_ratio: f64,
    /// VaR contributed by one unit of the instrument.
    pub per_unit_var: f64,
    /// Annualized instrument volatility.
    pub instrument_vol: f64,
    /// Annualized volatility target for the position.
    pub target_vol: f64,
    /// Baseline size in units for the vol-target and risk-parity
    /// candidates.
    pub base_size: f64,
    /// Gross leverage already deployed.
    pub current_leverage: f64,
    /// Current correlation exposure in [0, 1].
    pub correlation_exposure: f64,
    /// Annualized vols for every leg of a multi-leg package, primary
    /// leg first. Empty for single-leg trades.
    pub package_leg_vols: Vec<f64>,
}

/// Computes sized positions under the configured risk limits.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    params: RiskParameters,
}

impl PositionSizer {
    pub fn new(params: RiskParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    /// Kelly fraction `(p*b - q)/b`, clipped to [0, 0.25].
    pub fn kelly_fraction(win_probability: f64, win_loss_ratio: f64) -> f64 {
        if win_loss_ratio <= 0.0 {
            return 0.0;
        }
        let p = win_probability.clamp(0.0, 1.0);
        let q = 1.0 - p;
        ((p * win_loss_ratio - q) / win_loss_ratio).clamp(0.0, KELLY_CAP)
    }

    fn kelly_size(&self, inputs: &SizingInputs) -> Option<f64> {
        if inputs.entry_price <= 0.0 || inputs.portfolio_value <= 0.0 {
            return None;
        }
        let fraction = Self::kelly_fraction(inputs.win_probability, inputs.win_loss_ratio);
        Some(fraction * inputs.portfolio_value / inputs.entry_price)
    }

    /// Largest size whose VaR stays inside the per-position budget.
    fn var_bounded_size(&self, inputs: &SizingInputs) -> Option<f64> {
        if inputs.per_unit_var <= 0.0 || inputs.portfolio_value <= 0.0 {
            return None;
        }
        Some(self.params.max_individual_var * inputs.portfolio_value / inputs.per_unit_var)
    }

    /// Scale the base size to the volatility target.
    fn vol_targeted_size(&self, inputs: &SizingInputs) -> Option<f64> {
        if inputs.instrument_vol <= 0.0 || inputs.target_vol <= 0.0 || inputs.base_size <= 0.0 {
            return None;
        }
        Some(inputs.base_size * inputs.target_vol / inputs.instrument_vol)
    }

    /// Risk-parity allocation for a multi-leg package: each leg gets
    /// notional inversely proportional to its volatility.
    pub fn risk_parity_notionals(&self, total_notional: f64, leg_vols: &[f64]) -> Vec<f64> {
        if total_notional <= 0.0 || leg_vols.is_empty() {
            return vec![0.0; leg_vols.len()];
        }
        let inverses: Vec<f64> = leg_vols
            .iter()
            .map(|v| if *v > 0.0 { 1.0 / v } else { 0.0 })
            .collect();
        let total_inverse: f64 = inverses.iter().sum();
        if total_inverse <= 0.0 {
            // No usable vols: fall back to equal allocation.
            return vec![total_notional / leg_vols.len() as f64; leg_vols.len()];
        }
        inverses
            .iter()
            .map(|inv| total_notional * inv / total_inverse)
            .collect()
    }

    /// Risk-parity candidate for the primary leg of a multi-leg package.
    ///
    /// Allocates the baseline package notional (every leg at the base
    /// size) across legs inversely to their vols and converts the primary
    /// leg's share back to units. Equal vols reproduce the base size; a
    /// primary leg more volatile than its hedges gets cut below it.
    fn risk_parity_size(&self, inputs: &SizingInputs) -> Option<f64> {
        let vols = &inputs.package_leg_vols;
        if vols.len() < 2 || inputs.entry_price <= 0.0 || inputs.base_size <= 0.0 {
            return None;
        }
        let total_notional = inputs.base_size * inputs.entry_price * vols.len() as f64;
        let allocations = self.risk_parity_notionals(total_notional, vols);
        let primary_notional = allocations.first().copied()?;
        if primary_notional <= 0.0 {
            return None;
        }
        Some(primary_notional / inputs.entry_price)
    }

    /// Final recommended size in units.
    pub fn recommend(&self, inputs: &SizingInputs) -> f64 {
        let candidates = [
            self.kelly_size(inputs),
            self.var_bounded_size(inputs),
            self.vol_targeted_size(inputs),
            self.risk_parity_size(inputs),
        ];
        let mut size = candidates
            .into_iter()
            .flatten()
            .filter(|s| s.is_finite() && *s > 0.0)
            .fold(f64::INFINITY, f64::min);
        if !size.is_finite() {
            return 0.0;
        }

        // Leverage headroom caps the notional we may still deploy.
        let headroom = (self.params.max_leverage - inputs.current_leverage).max(0.0);
        if inputs.entry_price > 0.0 {
            let max_units = headroom * inputs.portfolio_value / inputs.entry_price;
            size = size.min(max_units);
        }

        // Correlation scaling: fully correlated books get nothing new.
        let correlation_scale = if self.params.max_correlation_risk > 0.0 {
            (1.0 - inputs.correlation_exposure / self.params.max_correlation_risk).clamp(0.0, 1.0)
        } else {
            0.0
        };
        size *= correlation_scale;

        debug!(
            size,
            correlation_scale,
            leverage_headroom = headroom,
            "Position sized"
        );
        size.max(0.0)
    }
}
