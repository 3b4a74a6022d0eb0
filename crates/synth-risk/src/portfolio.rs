//! Portfolio aggregation and limit monitoring.
//!
//! Tracks open positions with realized/unrealized P&L, aggregate
//! exposures, parametric VaR through the basket covariance, a rolling
//! Sharpe ratio, and risk-limit breaches. Emergency reduction halves
//! every position when any limit is breached.

use std::collections::{HashMap, VecDeque};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use synth_core::{InstrumentId, MarketSnapshot, Price, Side, Size};
use synth_pricing::{BasketModel, PricingModel};

use crate::params::RiskParameters;

/// VaR multiplier for the 95% one-sided normal quantile.
const VAR_Z_95: f64 = 1.65;

/// Rolling P&L observations kept for the Sharpe ratio.
const PNL_HISTORY: usize = 250;

/// One open position.
#[derive(Debug, Clone)]
pub struct Position {
    pub instrument: InstrumentId,
    /// Signed size: positive long, negative short.
    pub size: Decimal,
    pub entry_price: Price,
    pub mark_price: Price,
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn unrealized_pnl(&self) -> Decimal {
        (self.mark_price.inner() - self.entry_price.inner()) * self.size
    }

    pub fn notional(&self) -> Decimal {
        self.size.abs() * self.mark_price.inner()
    }

    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }
}

/// A breached portfolio limit.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskBreach {
    PositionSize { instrument: InstrumentId, fraction: f64 },
    PortfolioVar { var_fraction: f64 },
    Leverage { leverage: f64 },
    CorrelationRisk { correlation: f64 },
    Drawdown { drawdown: f64 },
}

/// Aggregated portfolio state.
pub struct Portfolio {
    params: RiskParameters,
    cash: Decimal,
    positions: HashMap<InstrumentId, Position>,
    pnl_history: VecDeque<f64>,
    peak_value: Decimal,
}

impl Portfolio {
    pub fn new(params: RiskParameters, starting_cash: Decimal) -> Self {
        Self {
            params,
            cash: starting_cash,
            positions: HashMap::new(),
            pnl_history: VecDeque::new(),
            peak_value: starting_cash,
        }
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position(&self, instrument: &InstrumentId) -> Option<&Position> {
        self.positions.get(instrument)
    }

    /// Apply a fill, netting against any existing position and realizing
    /// P&L on the closed portion.
    pub fn apply_fill(&mut self, instrument: &InstrumentId, side: Side, size: Size, price: Price) {
        let signed = match side {
            Side::Buy => size.inner(),
            Side::Sell => -size.inner(),
        };
        let position = self
            .positions
            .entry(instrument.clone())
            .or_insert_with(|| Position {
                instrument: instrument.clone(),
                size: Decimal::ZERO,
                entry_price: price,
                mark_price: price,
                realized_pnl: Decimal::ZERO,
            });

        let same_direction = position.size.is_zero()
            || (position.size.is_sign_positive() == signed.is_sign_positive());
        if same_direction {
            // Extend: blend the entry price by notional.
            let old_notional = position.entry_price.inner() * position.size.abs();
            let add_notional = price.inner() * signed.abs();
            let new_size = position.size + signed;
            if !new_size.is_zero() {
                position.entry_price =
                    Price::new((old_notional + add_notional) / new_size.abs());
            }
            position.size = new_size;
        } else {
            // Reduce or flip: realize on the overlapping quantity.
            let closing = signed.abs().min(position.size.abs());
            let direction = if position.size.is_sign_positive() {
                Decimal::ONE
            } else {
                -Decimal::ONE
            };
            let pnl = (price.inner() - position.entry_price.inner()) * closing * direction;
            position.realized_pnl += pnl;
            self.cash += pnl;
            position.size += signed;
            if position.size.is_zero() {
                position.entry_price = price;
            } else if position.size.is_sign_positive() != direction.is_sign_positive() {
                // Flipped through flat: remainder opens at the fill price.
                position.entry_price = price;
            }
        }
        position.mark_price = price;
    }

    /// Re-mark every position from a snapshot.
    pub fn mark_from_snapshot(&mut self, snapshot: &MarketSnapshot) {
        for position in self.positions.values_mut() {
            if let Some(mid) = snapshot.mid(&position.instrument) {
                position.mark_price = mid;
            }
        }
        let value = self.value();
        if value > self.peak_value {
            self.peak_value = value;
        }
    }

    /// Portfolio value: cash plus unrealized P&L.
    pub fn value(&self) -> Decimal {
        self.cash
            + self
                .positions
                .values()
                .map(Position::unrealized_pnl)
                .sum::<Decimal>()
    }

    pub fn gross_exposure(&self) -> Decimal {
        self.positions.values().map(Position::notional).sum()
    }

    pub fn net_exposure(&self) -> Decimal {
        self.positions
            .values()
            .map(|p| p.size * p.mark_price.inner())
            .sum()
    }

    pub fn leverage(&self) -> f64 {
        let value = self.value().to_f64().unwrap_or(0.0);
        if value <= 0.0 {
            return f64::INFINITY;
        }
        self.gross_exposure().to_f64().unwrap_or(0.0) / value
    }

    /// Parametric portfolio VaR: `1.65 * sigma_p * gross_exposure`, with
    /// the portfolio vol taken from the basket covariance.
    pub fn portfolio_var(&self, basket: &BasketModel) -> Option<f64> {
        let gross = self.gross_exposure().to_f64()?;
        if gross <= 0.0 {
            return Some(0.0);
        }
        let components: Vec<(InstrumentId, f64)> = self
            .positions
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| {
                let weight = p.notional().to_f64().unwrap_or(0.0) / gross;
                (p.instrument.clone(), weight)
            })
            .collect();
        let sigma = basket.portfolio_volatility(&components)?;
        Some(VAR_Z_95 * sigma * gross)
    }

    /// Record one P&L observation for the rolling Sharpe ratio.
    pub fn record_pnl(&mut self, pnl: f64) {
        self.pnl_history.push_back(pnl);
        while self.pnl_history.len() > PNL_HISTORY {
            self.pnl_history.pop_front();
        }
    }

    /// Rolling Sharpe from recorded P&L (mean over std).
    pub fn sharpe(&self) -> Option<f64> {
        if self.pnl_history.len() < 2 {
            return None;
        }
        let n = self.pnl_history.len() as f64;
        let mean = self.pnl_history.iter().sum::<f64>() / n;
        let var = self
            .pnl_history
            .iter()
            .map(|p| (p - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        let std = var.sqrt();
        if std <= f64::EPSILON {
            return None;
        }
        Some(mean / std)
    }

    /// Maximum pairwise |correlation| over open positions.
    pub fn correlation_risk(&self, basket: &BasketModel) -> f64 {
        let instruments: Vec<&InstrumentId> = self
            .positions
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| &p.instrument)
            .collect();
        let mut max_rho: f64 = 0.0;
        for i in 0..instruments.len() {
            for j in (i + 1)..instruments.len() {
                if let Some(rho) = basket.correlation(instruments[i], instruments[j]) {
                    max_rho = max_rho.max(rho.abs());
                }
            }
        }
        max_rho
    }

    /// Peak-to-trough drawdown fraction.
    pub fn drawdown(&self) -> f64 {
        let peak = self.peak_value.to_f64().unwrap_or(0.0);
        if peak <= 0.0 {
            return 0.0;
        }
        let value = self.value().to_f64().unwrap_or(0.0);
        ((peak - value) / peak).max(0.0)
    }

    /// All currently breached limits.
    pub fn breaches(&self, basket: &BasketModel) -> Vec<RiskBreach> {
        let mut breaches = Vec::new();
        let value = self.value().to_f64().unwrap_or(0.0);

        if value > 0.0 {
            for position in self.positions.values().filter(|p| !p.is_flat()) {
                let fraction = position.notional().to_f64().unwrap_or(0.0) / value;
                if fraction > self.params.max_position_size_percentage {
                    breaches.push(RiskBreach::PositionSize {
                        instrument: position.instrument.clone(),
                        fraction,
                    });
                }
            }
            if let Some(var) = self.portfolio_var(basket) {
                let var_fraction = var / value;
                if var_fraction > self.params.max_portfolio_var {
                    breaches.push(RiskBreach::PortfolioVar { var_fraction });
                }
            }
        }

        let leverage = self.leverage();
        if leverage > self.params.max_leverage {
            breaches.push(RiskBreach::Leverage { leverage });
        }
        let correlation = self.correlation_risk(basket);
        if correlation > self.params.max_correlation_risk {
            breaches.push(RiskBreach::CorrelationRisk { correlation });
        }
        let drawdown = self.drawdown();
        if drawdown > self.params.max_drawdown_threshold {
            breaches.push(RiskBreach::Drawdown { drawdown });
        }
        breaches
    }

    /// Halve every open position. Returns the instruments reduced.
    pub fn emergency_reduce(&mut self) -> Vec<InstrumentId> {
        let mut reduced = Vec::new();
        for position in self.positions.values_mut() {
            if position.is_flat() {
                continue;
            }
            warn!(
                instrument = %position.instrument,
                old_size = %position.size,
                "Emergency reduction: halving position"
            );
            position.size /= Decimal::TWO;
            reduced.push(position.instrument.clone());
        }
        reduced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn portfolio() -> Portfolio {
        Portfolio::new(RiskParameters::default(), dec!(1000000))
    }

    fn btc() -> InstrumentId {
        InstrumentId::from("BTC/USD")
    }

    #[test]
    fn test_fill_and_unrealized_pnl() {
        let mut p = portfolio();
        p.apply_fill(&btc(), Side::Buy, Size::new(dec!(2)), Price::new(dec!(30000)));
        let position = p.position(&btc()).unwrap();
        assert_eq!(position.size, dec!(2));
        assert_eq!(position.entry_price, Price::new(dec!(30000)));

        // Mark up 500: unrealized 1000.
        let mut snapshot = MarketSnapshot::default();
        snapshot.quotes.insert(
            btc(),
            synth_core::Quote::new(
                btc(),
                Price::new(dec!(30495)),
                Price::new(dec!(30505)),
                Size::new(dec!(1)),
                Size::new(dec!(1)),
                chrono::Utc::now(),
                1,
            ),
        );
        p.mark_from_snapshot(&snapshot);
        assert_eq!(p.position(&btc()).unwrap().unrealized_pnl(), dec!(1000));
        assert_eq!(p.value(), dec!(1001000));
    }

    #[test]
    fn test_reduce_realizes_pnl() {
        let mut p = portfolio();
        p.apply_fill(&btc(), Side::Buy, Size::new(dec!(2)), Price::new(dec!(30000)));
        p.apply_fill(&btc(), Side::Sell, Size::new(dec!(1)), Price::new(dec!(31000)));
        let position = p.position(&btc()).unwrap();
        assert_eq!(position.size, dec!(1));
        assert_eq!(position.realized_pnl, dec!(1000));
        assert_eq!(p.cash, dec!(1001000));
    }

    #[test]
    fn test_average_entry_on_extension() {
        let mut p = portfolio();
        p.apply_fill(&btc(), Side::Buy, Size::new(dec!(1)), Price::new(dec!(30000)));
        p.apply_fill(&btc(), Side::Buy, Size::new(dec!(1)), Price::new(dec!(32000)));
        assert_eq!(
            p.position(&btc()).unwrap().entry_price,
            Price::new(dec!(31000))
        );
    }

    #[test]
    fn test_exposures() {
        let mut p = portfolio();
        p.apply_fill(&btc(), Side::Buy, Size::new(dec!(1)), Price::new(dec!(30000)));
        p.apply_fill(
            &InstrumentId::from("ETH/USD"),
            Side::Sell,
            Size::new(dec!(5)),
            Price::new(dec!(2000)),
        );
        assert_eq!(p.gross_exposure(), dec!(40000));
        assert_eq!(p.net_exposure(), dec!(20000));
        assert!(p.leverage() > 0.0);
    }

    #[test]
    fn test_emergency_reduce_halves() {
        let mut p = portfolio();
        p.apply_fill(&btc(), Side::Buy, Size::new(dec!(4)), Price::new(dec!(30000)));
        let reduced = p.emergency_reduce();
        assert_eq!(reduced, vec![btc()]);
        assert_eq!(p.position(&btc()).unwrap().size, dec!(2));
    }

    #[test]
    fn test_position_size_breach() {
        let mut p = portfolio();
        // 120k notional against 1M value exceeds the 5% cap.
        p.apply_fill(&btc(), Side::Buy, Size::new(dec!(4)), Price::new(dec!(30000)));
        let basket = BasketModel::new(synth_pricing::ModelParameters::default());
        let breaches = p.breaches(&basket);
        assert!(breaches
            .iter()
            .any(|b| matches!(b, RiskBreach::PositionSize { .. })));
    }

    #[test]
    fn test_sharpe_needs_history() {
        let mut p = portfolio();
        assert!(p.sharpe().is_none());
        for i in 0..10 {
            p.record_pnl(if i % 2 == 0 { 120.0 } else { -80.0 });
        }
        assert!(p.sharpe().is_some());
    }
}
