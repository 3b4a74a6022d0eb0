//! Cost-of-carry forward model.
//!
//! `forward = spot_mid * exp((r - q) * tau)` with `r` the per-instrument
//! risk-free rate, `q` the dividend/borrow yield and `tau` the time to
//! maturity in years. Negative maturity is a domain error, not a panic.

use std::collections::HashMap;

use synth_core::{Instrument, InstrumentId, MarketSnapshot, Price, SyntheticPrice};

use crate::confidence::confidence_score;
use crate::error::{ModelError, ModelResult};
use crate::history::PriceHistory;
use crate::model::{ModelParameters, PricingModel};

/// Per-instrument carry inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarryRates {
    /// Annualized risk-free rate.
    pub risk_free_rate: f64,
    /// Annualized dividend/borrow yield.
    pub carry_yield: f64,
}

/// Prices dated forwards and futures off spot.
pub struct CostOfCarryModel {
    params: ModelParameters,
    instruments: HashMap<InstrumentId, Instrument>,
    rates: HashMap<InstrumentId, CarryRates>,
    history: PriceHistory,
}

impl CostOfCarryModel {
    pub fn new(params: ModelParameters) -> Self {
        let window = params.lookback_period;
        Self {
            params,
            instruments: HashMap::new(),
            rates: HashMap::new(),
            history: PriceHistory::new(window),
        }
    }

    /// Register a dated instrument so the model can find its expiry.
    pub fn register_instrument(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.id.clone(), instrument);
    }

    /// Override carry rates for one instrument.
    pub fn set_rates(&mut self, instrument: InstrumentId, rates: CarryRates) {
        self.rates.insert(instrument, rates);
    }

    fn rates_for(&self, instrument: &InstrumentId) -> CarryRates {
        self.rates.get(instrument).copied().unwrap_or(CarryRates {
            risk_free_rate: self.params.risk_free_rate,
            carry_yield: self.params.dividend_yield,
        })
    }

    /// Forward price for a spot level.
    pub fn forward(spot: f64, rates: CarryRates, tau: f64) -> ModelResult<f64> {
        if tau < 0.0 {
            return Err(ModelError::Domain(format!(
                "negative time to maturity: {tau}"
            )));
        }
        if spot <= 0.0 {
            return Err(ModelError::Domain(format!("non-positive spot: {spot}")));
        }
        Ok(spot * ((rates.risk_free_rate - rates.carry_yield) * tau).exp())
    }

    /// Basis of the quoted future against the carry-implied forward.
    pub fn basis(
        &self,
        snapshot: &MarketSnapshot,
        future: &InstrumentId,
        spot: &InstrumentId,
    ) -> ModelResult<f64> {
        let quoted = snapshot
            .mid(future)
            .ok_or_else(|| ModelError::UnknownInstrument(future.clone()))?;
        let synthetic = self.synthetic_price(future, &[spot.clone()], snapshot)?;
        Ok(quoted.to_f64() - synthetic.theoretical.to_f64())
    }
}

impl PricingModel for CostOfCarryModel {
    fn name(&self) -> &'static str {
        "cost_of_carry"
    }

    fn ingest(&mut self, snapshot: &MarketSnapshot) {
        self.history.observe(snapshot);
    }

    fn synthetic_price(
        &self,
        target: &InstrumentId,
        components: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> ModelResult<SyntheticPrice> {
        let spot_id = components
            .first()
            .ok_or_else(|| ModelError::Domain("carry model needs a spot component".into()))?;
        let spot = snapshot
            .quote(spot_id)
            .ok_or_else(|| ModelError::UnknownInstrument(spot_id.clone()))?;
        let definition = self
            .instruments
            .get(target)
            .ok_or_else(|| ModelError::UnknownInstrument(target.clone()))?;
        let tau = definition
            .time_to_expiry_years(snapshot.snapshot_time)
            .ok_or_else(|| ModelError::Domain(format!("{target} has no expiry")))?;

        let rates = self.rates_for(target);
        let theoretical = Self::forward(spot.mid().to_f64(), rates, tau)?;
        let bid = Self::forward(spot.bid_price.to_f64(), rates, tau)?;
        let ask = Self::forward(spot.ask_price.to_f64(), rates, tau)?;

        let confidence = confidence_score(
            &[spot],
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            self.history.sample_ratio(spot_id),
        );

        let to_price = |v: f64| {
            Price::from_f64(v).ok_or_else(|| ModelError::Domain(format!("bad forward price {v}")))
        };
        Ok(SyntheticPrice::new(
            to_price(theoretical)?,
            to_price(bid)?,
            to_price(ask)?,
            confidence,
            vec![spot_id.clone()],
            vec![1.0],
        )?)
    }

    fn correlation(&self, a: &InstrumentId, b: &InstrumentId) -> Option<f64> {
        self.history.correlation(a, b)
    }

    fn update_parameters(&mut self, params: ModelParameters) {
        if params.lookback_period != self.params.lookback_period {
            self.history = PriceHistory::new(params.lookback_period);
        }
        self.params = params;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use synth_core::{Quote, Size};

    fn snapshot() -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::default();
        let now = Utc::now();
        let q = Quote::new(
            InstrumentId::from("BTC/USD"),
            Price::new(dec!(29990)),
            Price::new(dec!(30010)),
            Size::new(dec!(5)),
            Size::new(dec!(5)),
            now,
            1,
        );
        snapshot.quotes.insert(InstrumentId::from("BTC/USD"), q);
        snapshot.snapshot_time = now;
        snapshot
    }

    fn model_with_future(expiry_days: i64) -> (CostOfCarryModel, InstrumentId) {
        let mut model = CostOfCarryModel::new(ModelParameters::default());
        let future = InstrumentId::from("BTC-26DEC26");
        model.register_instrument(Instrument::future(
            future.clone(),
            Price::new(dec!(0.5)),
            Size::new(dec!(0.001)),
            Utc::now() + Duration::days(expiry_days),
        ));
        (model, future)
    }

    #[test]
    fn test_forward_formula() {
        let rates = CarryRates {
            risk_free_rate: 0.05,
            carry_yield: 0.01,
        };
        let forward = CostOfCarryModel::forward(30000.0, rates, 0.5).unwrap();
        assert!((forward - 30000.0 * (0.04f64 * 0.5).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_negative_tau_is_domain_error() {
        let (model, future) = model_with_future(-10);
        let err = model
            .synthetic_price(&future, &[InstrumentId::from("BTC/USD")], &snapshot())
            .unwrap_err();
        assert!(matches!(err, ModelError::Domain(_)));
    }

    #[test]
    fn test_synthetic_bid_below_ask() {
        let (model, future) = model_with_future(180);
        let sp = model
            .synthetic_price(&future, &[InstrumentId::from("BTC/USD")], &snapshot())
            .unwrap();
        assert!(sp.bid < sp.ask);
        assert!(sp.theoretical > Price::new(dec!(30000)));
    }

    #[test]
    fn test_unregistered_future() {
        let model = CostOfCarryModel::new(ModelParameters::default());
        let err = model
            .synthetic_price(
                &InstrumentId::from("BTC-26DEC26"),
                &[InstrumentId::from("BTC/USD")],
                &snapshot(),
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownInstrument(_)));
    }
}
