//! Statistical mean-reversion model.
//!
//! The theoretical price is the rolling mean over the lookback window;
//! Bollinger bands at `k` standard deviations bound the synthetic quote.

use synth_core::{InstrumentId, MarketSnapshot, Price, SyntheticPrice};

use crate::confidence::confidence_score;
use crate::error::{ModelError, ModelResult};
use crate::history::PriceHistory;
use crate::model::{ModelParameters, PricingModel};

/// Mean-reversion pricing off a bounded mid-price history.
pub struct StatArbModel {
    params: ModelParameters,
    history: PriceHistory,
}

impl StatArbModel {
    pub fn new(params: ModelParameters) -> Self {
        let window = params.lookback_period;
        Self {
            params,
            history: PriceHistory::new(window),
        }
    }

    /// Bollinger bands (mean, upper, lower) for an instrument.
    pub fn bollinger(&self, instrument: &InstrumentId) -> Option<(f64, f64, f64)> {
        self.history.bollinger(instrument, self.params.bollinger_k)
    }

    /// Z-score of the current snapshot mid against the history.
    pub fn z_score(&self, instrument: &InstrumentId, snapshot: &MarketSnapshot) -> Option<f64> {
        let mid = snapshot.mid(instrument)?.to_f64();
        self.history.z_score(instrument, mid)
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }
}

impl PricingModel for StatArbModel {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn ingest(&mut self, snapshot: &MarketSnapshot) {
        self.history.observe(snapshot);
    }

    fn synthetic_price(
        &self,
        target: &InstrumentId,
        _components: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> ModelResult<SyntheticPrice> {
        let quote = snapshot
            .quote(target)
            .ok_or_else(|| ModelError::UnknownInstrument(target.clone()))?;
        let have = self.history.len(target);
        let need = self.params.lookback_period;
        if have < need {
            return Err(ModelError::InsufficientHistory {
                instrument: target.clone(),
                have,
                need,
            });
        }
        let (mean, upper, lower) = self
            .history
            .bollinger(target, self.params.bollinger_k)
            .ok_or_else(|| ModelError::InsufficientHistory {
                instrument: target.clone(),
                have,
                need,
            })?;

        let confidence = confidence_score(
            &[quote],
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            self.history.sample_ratio(target),
        );

        let to_price = |v: f64| {
            Price::from_f64(v).ok_or_else(|| ModelError::Domain(format!("bad band price {v}")))
        };
        Ok(SyntheticPrice::new(
            to_price(mean)?,
            to_price(lower)?,
            to_price(upper)?,
            confidence,
            vec![target.clone()],
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
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use synth_core::{Quote, Size};

    fn snapshot_at(mid: f64) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::default();
        let now = Utc::now();
        let half = rust_decimal::Decimal::from_f64_retain(mid).unwrap();
        snapshot.quotes.insert(
            InstrumentId::from("BTC/USD"),
            Quote::new(
                InstrumentId::from("BTC/USD"),
                Price::new(half - dec!(5)),
                Price::new(half + dec!(5)),
                Size::new(dec!(1)),
                Size::new(dec!(1)),
                now,
                1,
            ),
        );
        snapshot.snapshot_time = now;
        snapshot
    }

    fn warm_model(window: usize) -> StatArbModel {
        let params = ModelParameters {
            lookback_period: window,
            ..ModelParameters::default()
        };
        let mut model = StatArbModel::new(params);
        for i in 0..window {
            // Oscillate around 30000.
            let mid = 30000.0 + if i % 2 == 0 { 20.0 } else { -20.0 };
            model.ingest(&snapshot_at(mid));
        }
        model
    }

    #[test]
    fn test_insufficient_history() {
        let model = StatArbModel::new(ModelParameters::default());
        let err = model
            .synthetic_price(&InstrumentId::from("BTC/USD"), &[], &snapshot_at(30000.0))
            .unwrap_err();
        assert!(matches!(err, ModelError::InsufficientHistory { .. }));
    }

    #[test]
    fn test_mean_reversion_price() {
        let model = warm_model(10);
        let sp = model
            .synthetic_price(&InstrumentId::from("BTC/USD"), &[], &snapshot_at(30100.0))
            .unwrap();
        let theo = sp.theoretical.to_f64();
        assert!((theo - 30000.0).abs() < 1.0);
        assert!(sp.bid.to_f64() < theo && theo < sp.ask.to_f64());
    }

    #[test]
    fn test_z_score_sign() {
        let model = warm_model(10);
        let z = model
            .z_score(&InstrumentId::from("BTC/USD"), &snapshot_at(30100.0))
            .unwrap();
        assert!(z > 0.0);
    }
}
