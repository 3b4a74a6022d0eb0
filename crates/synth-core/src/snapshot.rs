//! Point-in-time market composite.
//!
//! Snapshots are immutable once published: the aggregator builds a new one
//! per tick and shares it behind `Arc`; readers never need a lock.

use crate::{ExchangeId, FundingRate, InstrumentId, MarketDepth, Price, Quote, Trade};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable composite of the freshest market data per instrument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Best quote per instrument (tightest spread across exchanges).
    pub quotes: HashMap<InstrumentId, Quote>,
    /// Full per-exchange quote map for cross-exchange consumers.
    pub exchange_quotes: HashMap<InstrumentId, HashMap<ExchangeId, Quote>>,
    /// Bounded recent trades per instrument, oldest first.
    pub recent_trades: HashMap<InstrumentId, Vec<Trade>>,
    /// Level-2 depth per instrument.
    pub depth: HashMap<InstrumentId, MarketDepth>,
    /// Latest funding rate per perpetual.
    pub funding_rates: HashMap<InstrumentId, FundingRate>,
    /// Maximum timestamp across included instruments.
    pub snapshot_time: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn quote(&self, instrument: &InstrumentId) -> Option<&Quote> {
        self.quotes.get(instrument)
    }

    /// Quote for an instrument on a specific exchange.
    pub fn exchange_quote(&self, instrument: &InstrumentId, exchange: &ExchangeId) -> Option<&Quote> {
        self.exchange_quotes.get(instrument)?.get(exchange)
    }

    /// Exchanges currently quoting an instrument.
    pub fn venues(&self, instrument: &InstrumentId) -> usize {
        self.exchange_quotes
            .get(instrument)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub fn mid(&self, instrument: &InstrumentId) -> Option<Price> {
        self.quote(instrument).map(Quote::mid)
    }

    pub fn depth(&self, instrument: &InstrumentId) -> Option<&MarketDepth> {
        self.depth.get(instrument)
    }

    pub fn funding(&self, instrument: &InstrumentId) -> Option<&FundingRate> {
        self.funding_rates.get(instrument)
    }

    pub fn trades(&self, instrument: &InstrumentId) -> &[Trade] {
        self.recent_trades
            .get(instrument)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.quotes.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Price, Size};
    use rust_decimal_macros::dec;

    #[test]
    fn test_lookup_helpers() {
        let mut snapshot = MarketSnapshot::default();
        let btc = InstrumentId::from("BTC/USD");
        let quote = Quote::new(
            btc.clone(),
            Price::new(dec!(30000)),
            Price::new(dec!(30010)),
            Size::new(dec!(2)),
            Size::new(dec!(2)),
            Utc::now(),
            7,
        );
        snapshot.quotes.insert(btc.clone(), quote.clone());
        snapshot
            .exchange_quotes
            .entry(btc.clone())
            .or_default()
            .insert(ExchangeId::from("binance"), quote);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.venues(&btc), 1);
        assert_eq!(snapshot.mid(&btc), Some(Price::new(dec!(30005))));
        assert!(snapshot.trades(&btc).is_empty());
        assert!(snapshot.quote(&InstrumentId::from("ETH/USD")).is_none());
    }
}
