//! Perpetual-swap basis model.
//!
//! Theoretical perpetual price is spot mid scaled by the current funding
//! rate: `spot_mid * (1 + funding)`. Basis is perp mid minus spot mid;
//! excess basis is what the basis detector trades on.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::debug;

use synth_core::{FundingRate, InstrumentId, MarketSnapshot, Price, Quote, SyntheticPrice};

use crate::confidence::confidence_score;
use crate::error::{ModelError, ModelResult};
use crate::history::PriceHistory;
use crate::model::{ModelParameters, PricingModel};

/// Prices perpetual swaps off spot and funding.
pub struct PerpetualBasisModel {
    params: ModelParameters,
    funding: HashMap<InstrumentId, FundingRate>,
    history: PriceHistory,
}

impl PerpetualBasisModel {
    pub fn new(params: ModelParameters) -> Self {
        let window = params.lookback_period;
        Self {
            params,
            funding: HashMap::new(),
            history: PriceHistory::new(window),
        }
    }

    /// Stored funding rate, or the configured default (1 bp).
    pub fn funding_rate(&self, perpetual: &InstrumentId) -> Decimal {
        self.funding
            .get(perpetual)
            .map(|f| f.rate)
            .unwrap_or(self.params.default_funding_rate)
    }

    /// Theoretical perpetual price for a spot quote.
    pub fn theoretical(&self, spot: &Quote, perpetual: &InstrumentId) -> Price {
        let scale = Decimal::ONE + self.funding_rate(perpetual);
        spot.mid() * scale
    }

    /// Raw basis: perp mid minus spot mid.
    pub fn basis(
        &self,
        snapshot: &MarketSnapshot,
        perpetual: &InstrumentId,
        spot: &InstrumentId,
    ) -> ModelResult<Decimal> {
        let perp_mid = snapshot
            .mid(perpetual)
            .ok_or_else(|| ModelError::UnknownInstrument(perpetual.clone()))?;
        let spot_mid = snapshot
            .mid(spot)
            .ok_or_else(|| ModelError::UnknownInstrument(spot.clone()))?;
        Ok(perp_mid.inner() - spot_mid.inner())
    }

    /// Basis in excess of the funding-implied theoretical basis.
    pub fn excess_basis(
        &self,
        snapshot: &MarketSnapshot,
        perpetual: &InstrumentId,
        spot: &InstrumentId,
    ) -> ModelResult<Decimal> {
        let perp_mid = snapshot
            .mid(perpetual)
            .ok_or_else(|| ModelError::UnknownInstrument(perpetual.clone()))?;
        let spot_quote = snapshot
            .quote(spot)
            .ok_or_else(|| ModelError::UnknownInstrument(spot.clone()))?;
        let theoretical = self.theoretical(spot_quote, perpetual);
        Ok(perp_mid.inner() - theoretical.inner())
    }
}

impl PricingModel for PerpetualBasisModel {
    fn name(&self) -> &'static str {
        "perpetual_basis"
    }

    fn ingest(&mut self, snapshot: &MarketSnapshot) {
        for (instrument, funding) in &snapshot.funding_rates {
            let newer = self
                .funding
                .get(instrument)
                .map(|f| funding.timestamp > f.timestamp)
                .unwrap_or(true);
            if newer {
                debug!(%instrument, rate = %funding.rate, "Funding rate updated");
                self.funding.insert(instrument.clone(), funding.clone());
            }
        }
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
            .ok_or_else(|| ModelError::Domain("perpetual model needs a spot component".into()))?;
        let spot = snapshot
            .quote(spot_id)
            .ok_or_else(|| ModelError::UnknownInstrument(spot_id.clone()))?;

        let scale = Decimal::ONE + self.funding_rate(target);
        let theoretical = spot.mid() * scale;
        let bid = spot.bid_price * scale;
        let ask = spot.ask_price * scale;

        let confidence = confidence_score(
            &[spot],
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            self.history.sample_ratio(spot_id),
        );

        Ok(SyntheticPrice::new(
            theoretical,
            bid,
            ask,
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
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use synth_core::Size;

    fn snapshot_with(spot_mid: (Decimal, Decimal), perp_mid: (Decimal, Decimal)) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::default();
        let now = Utc::now();
        for (id, (bid, ask)) in [("BTC/USD", spot_mid), ("BTC-PERP", perp_mid)] {
            let q = Quote::new(
                InstrumentId::from(id),
                Price::new(bid),
                Price::new(ask),
                Size::new(dec!(5)),
                Size::new(dec!(5)),
                now,
                1,
            );
            snapshot.quotes.insert(InstrumentId::from(id), q);
        }
        snapshot.snapshot_time = now;
        snapshot
    }

    #[test]
    fn test_theoretical_uses_funding() {
        let mut model = PerpetualBasisModel::new(ModelParameters::default());
        let snapshot = snapshot_with((dec!(29995), dec!(30005)), (dec!(30040), dec!(30050)));
        let perp = InstrumentId::from("BTC-PERP");

        let mut with_funding = snapshot.clone();
        with_funding.funding_rates.insert(
            perp.clone(),
            FundingRate::new(perp.clone(), dec!(0.0005), Utc::now()),
        );
        model.ingest(&with_funding);

        let sp = model
            .synthetic_price(&perp, &[InstrumentId::from("BTC/USD")], &snapshot)
            .unwrap();
        // 30000 * 1.0005 = 30015
        assert_eq!(sp.theoretical, Price::new(dec!(30015.0000)));

        let basis = model
            .basis(&snapshot, &perp, &InstrumentId::from("BTC/USD"))
            .unwrap();
        assert_eq!(basis, dec!(45));

        let excess = model
            .excess_basis(&snapshot, &perp, &InstrumentId::from("BTC/USD"))
            .unwrap();
        assert_eq!(excess, dec!(30.0000));
    }

    #[test]
    fn test_default_funding_is_one_bp() {
        let model = PerpetualBasisModel::new(ModelParameters::default());
        assert_eq!(model.funding_rate(&InstrumentId::from("ETH-PERP")), dec!(0.0001));
    }

    #[test]
    fn test_unknown_instrument() {
        let model = PerpetualBasisModel::new(ModelParameters::default());
        let snapshot = MarketSnapshot::default();
        let err = model
            .synthetic_price(
                &InstrumentId::from("BTC-PERP"),
                &[InstrumentId::from("BTC/USD")],
                &snapshot,
            )
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownInstrument(_)));
    }
}
