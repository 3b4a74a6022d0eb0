//! Cross-currency synthesis.
//!
//! A target pair A/C is synthesized from two component pairs sharing a
//! currency B. Component quotes are oriented (inverted if necessary) so
//! the chain multiplies out: synthetic bid = bid * bid and synthetic ask =
//! ask * ask, with an inverted leg contributing 1/ask as its bid.

use rust_decimal::Decimal;

use synth_core::{InstrumentId, MarketSnapshot, Price, Quote, SyntheticPrice};

use crate::confidence::confidence_score;
use crate::error::{ModelError, ModelResult};
use crate::history::PriceHistory;
use crate::model::{ModelParameters, PricingModel};

/// One component quote oriented into the target chain.
#[derive(Debug, Clone, Copy)]
struct OrientedLeg {
    bid: Decimal,
    ask: Decimal,
    /// +1.0 for a direct leg, -1.0 for an inverted one.
    sign: f64,
}

fn orient(quote: &Quote, want_base: &str, want_quote: &str) -> ModelResult<Option<OrientedLeg>> {
    let Some((base, counter)) = quote.instrument.as_pair() else {
        return Err(ModelError::Domain(format!(
            "{} is not a currency pair",
            quote.instrument
        )));
    };
    if base == want_base && counter == want_quote {
        return Ok(Some(OrientedLeg {
            bid: quote.bid_price.inner(),
            ask: quote.ask_price.inner(),
            sign: 1.0,
        }));
    }
    if base == want_quote && counter == want_base {
        if quote.bid_price.is_zero() || quote.ask_price.is_zero() {
            return Err(ModelError::Domain(format!(
                "cannot invert zero-priced quote {}",
                quote.instrument
            )));
        }
        // Inverting swaps and reciprocates the sides.
        return Ok(Some(OrientedLeg {
            bid: Decimal::ONE / quote.ask_price.inner(),
            ask: Decimal::ONE / quote.bid_price.inner(),
            sign: -1.0,
        }));
    }
    Ok(None)
}

/// Synthesizes currency pairs through a shared intermediate currency.
pub struct CrossCurrencyModel {
    params: ModelParameters,
    history: PriceHistory,
}

impl CrossCurrencyModel {
    pub fn new(params: ModelParameters) -> Self {
        let window = params.lookback_period;
        Self {
            params,
            history: PriceHistory::new(window),
        }
    }

    /// Arrange the two component quotes into an A/B, B/C chain for the
    /// target A/C, inverting legs as needed.
    fn chain(
        target: &InstrumentId,
        first: &Quote,
        second: &Quote,
    ) -> ModelResult<(OrientedLeg, OrientedLeg)> {
        let (base, counter) = target.as_pair().ok_or_else(|| {
            ModelError::Domain(format!("target {target} is not a currency pair"))
        })?;

        for (lead, trail) in [(first, second), (second, first)] {
            let Some((lead_base, lead_counter)) = lead.instrument.as_pair() else {
                continue;
            };
            // The lead leg must start at the target base; the shared
            // currency is whatever it converts into.
            let shared = if lead_base == base {
                lead_counter
            } else if lead_counter == base {
                lead_base
            } else {
                continue;
            };
            let Some(leg1) = orient(lead, base, shared)? else {
                continue;
            };
            let Some(leg2) = orient(trail, shared, counter)? else {
                continue;
            };
            return Ok((leg1, leg2));
        }
        Err(ModelError::Domain(format!(
            "components do not chain into {target}"
        )))
    }
}

impl PricingModel for CrossCurrencyModel {
    fn name(&self) -> &'static str {
        "cross_currency"
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
        let [first_id, second_id] = components else {
            return Err(ModelError::Domain(format!(
                "cross-currency needs exactly two components, got {}",
                components.len()
            )));
        };
        let first = snapshot
            .quote(first_id)
            .ok_or_else(|| ModelError::UnknownInstrument(first_id.clone()))?;
        let second = snapshot
            .quote(second_id)
            .ok_or_else(|| ModelError::UnknownInstrument(second_id.clone()))?;

        let (leg1, leg2) = Self::chain(target, first, second)?;

        let bid = leg1.bid * leg2.bid;
        let ask = leg1.ask * leg2.ask;
        let theoretical = (bid + ask) / Decimal::TWO;

        let confidence = confidence_score(
            &[first, second],
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            self.history
                .sample_ratio(first_id)
                .min(self.history.sample_ratio(second_id)),
        );

        Ok(SyntheticPrice::new(
            Price::new(theoretical),
            Price::new(bid),
            Price::new(ask),
            confidence,
            vec![first_id.clone(), second_id.clone()],
            vec![leg1.sign, leg2.sign],
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

    fn quote(pair: &str, bid: Decimal, ask: Decimal) -> Quote {
        Quote::new(
            InstrumentId::from(pair),
            Price::new(bid),
            Price::new(ask),
            Size::new(dec!(10)),
            Size::new(dec!(10)),
            Utc::now(),
            1,
        )
    }

    fn snapshot_of(quotes: Vec<Quote>) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::default();
        snapshot.snapshot_time = Utc::now();
        for q in quotes {
            snapshot.quotes.insert(q.instrument.clone(), q);
        }
        snapshot
    }

    #[test]
    fn test_direct_chain() {
        // BTC/USD from BTC/ETH * ETH/USD.
        let model = CrossCurrencyModel::new(ModelParameters::default());
        let snapshot = snapshot_of(vec![
            quote("BTC/ETH", dec!(15.10), dec!(15.12)),
            quote("ETH/USD", dec!(2000), dec!(2002)),
        ]);
        let sp = model
            .synthetic_price(
                &InstrumentId::from("BTC/USD"),
                &[InstrumentId::from("BTC/ETH"), InstrumentId::from("ETH/USD")],
                &snapshot,
            )
            .unwrap();
        assert_eq!(sp.bid, Price::new(dec!(30200.00)));
        assert_eq!(sp.ask, Price::new(dec!(30270.24)));
        assert_eq!(sp.weights, vec![1.0, 1.0]);
    }

    #[test]
    fn test_inverted_leg() {
        // ETH/BTC from ETH/USD and BTC/USD (second leg inverted).
        let model = CrossCurrencyModel::new(ModelParameters::default());
        let snapshot = snapshot_of(vec![
            quote("ETH/USD", dec!(2000), dec!(2002)),
            quote("BTC/USD", dec!(30000), dec!(30010)),
        ]);
        let sp = model
            .synthetic_price(
                &InstrumentId::from("ETH/BTC"),
                &[InstrumentId::from("ETH/USD"), InstrumentId::from("BTC/USD")],
                &snapshot,
            )
            .unwrap();
        // bid = 2000 / 30010, ask = 2002 / 30000
        assert_eq!(sp.bid, Price::new(dec!(2000) / dec!(30010)));
        assert_eq!(sp.ask, Price::new(dec!(2002) / dec!(30000)));
        assert_eq!(sp.weights, vec![1.0, -1.0]);
        assert!(sp.bid < sp.ask);
    }

    #[test]
    fn test_inversion_round_trip_consistency() {
        // Synthesize A/C, then C/A from the same legs; the bid/ask of one
        // must be the reciprocal of the other's ask/bid.
        let model = CrossCurrencyModel::new(ModelParameters::default());
        let snapshot = snapshot_of(vec![
            quote("BTC/ETH", dec!(15.10), dec!(15.12)),
            quote("ETH/USD", dec!(2000), dec!(2002)),
        ]);
        let forward = model
            .synthetic_price(
                &InstrumentId::from("BTC/USD"),
                &[InstrumentId::from("BTC/ETH"), InstrumentId::from("ETH/USD")],
                &snapshot,
            )
            .unwrap();
        let inverse = model
            .synthetic_price(
                &InstrumentId::from("USD/BTC"),
                &[InstrumentId::from("BTC/ETH"), InstrumentId::from("ETH/USD")],
                &snapshot,
            )
            .unwrap();
        let recovered_ask = Decimal::ONE / inverse.bid.inner();
        let recovered_bid = Decimal::ONE / inverse.ask.inner();
        let tol = dec!(0.01);
        assert!((recovered_ask - forward.ask.inner()).abs() < tol);
        assert!((recovered_bid - forward.bid.inner()).abs() < tol);
    }

    #[test]
    fn test_non_chaining_components() {
        let model = CrossCurrencyModel::new(ModelParameters::default());
        let snapshot = snapshot_of(vec![
            quote("BTC/ETH", dec!(15.10), dec!(15.12)),
            quote("SOL/USD", dec!(100), dec!(101)),
        ]);
        assert!(model
            .synthetic_price(
                &InstrumentId::from("BTC/USD"),
                &[InstrumentId::from("BTC/ETH"), InstrumentId::from("SOL/USD")],
                &snapshot,
            )
            .is_err());
    }
}
