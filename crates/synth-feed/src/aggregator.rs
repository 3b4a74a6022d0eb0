//! Per-exchange event ingest and snapshot assembly.
//!
//! One ordered stream exists per (exchange, instrument). The aggregator
//! keeps the freshest state per stream, drops out-of-sequence events, and
//! assembles immutable cross-exchange snapshots on demand.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use synth_core::{
    ExchangeId, FundingRate, InstrumentId, MarketDepth, MarketSnapshot, Price, Quote, StreamKey,
    Trade,
};
use synth_telemetry::metrics;

use crate::error::{FeedError, FeedResult};
use crate::event::FeedEvent;

/// Feed aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Quotes older than this are excluded from snapshots.
    #[serde(default = "default_staleness_budget_ms")]
    pub staleness_budget_ms: u64,
    /// Snapshot publication interval.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Recent trades retained per stream.
    #[serde(default = "default_recent_trade_depth")]
    pub recent_trade_depth: usize,
}

fn default_staleness_budget_ms() -> u64 {
    500
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_recent_trade_depth() -> usize {
    50
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            staleness_budget_ms: default_staleness_budget_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            recent_trade_depth: default_recent_trade_depth(),
        }
    }
}

impl FeedConfig {
    pub fn staleness_budget(&self) -> Duration {
        Duration::from_millis(self.staleness_budget_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Latest retained state for one (exchange, instrument) stream.
#[derive(Debug, Default)]
struct StreamEntry {
    quote: Option<Quote>,
    trades: VecDeque<Trade>,
    depth: Option<MarketDepth>,
    funding: Option<FundingRate>,
    mark_price: Option<(Price, DateTime<Utc>)>,
    index_price: Option<(Price, DateTime<Utc>)>,
    last_sequence: Option<u64>,
}

impl StreamEntry {
    /// Sequence admission: strictly increasing for sequenced events.
    ///
    /// Returns false when the event must be dropped. Gaps are warned and
    /// admitted.
    fn admit_sequence(&mut self, key: &StreamKey, sequence: u64) -> bool {
        match self.last_sequence {
            Some(last) if sequence <= last => {
                debug!(stream = %key, sequence, last, "Dropping stale-sequence event");
                metrics::FEED_EVENTS_DROPPED
                    .with_label_values(&["stale_sequence"])
                    .inc();
                false
            }
            Some(last) => {
                if sequence > last + 1 {
                    warn!(stream = %key, sequence, last, "Sequence gap observed");
                    metrics::SEQUENCE_GAPS.inc();
                }
                self.last_sequence = Some(sequence);
                true
            }
            None => {
                self.last_sequence = Some(sequence);
                true
            }
        }
    }
}

type Entry = Arc<RwLock<StreamEntry>>;

/// Market-data fan-in: per-exchange events in, unified snapshots out.
pub struct FeedAggregator {
    config: FeedConfig,
    streams: DashMap<StreamKey, Entry>,
}

impl FeedAggregator {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            streams: DashMap::new(),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    fn get_or_create(&self, key: StreamKey) -> Entry {
        self.streams
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(StreamEntry::default())))
            .clone()
    }

    /// Apply one normalized event from an exchange adapter.
    ///
    /// Out-of-sequence and malformed events are dropped and counted;
    /// neither aborts the stream.
    pub fn apply(&self, exchange: &ExchangeId, event: FeedEvent) {
        let key = StreamKey::new(exchange.clone(), event.instrument().clone());
        let entry = self.get_or_create(key.clone());
        let mut state = entry.write();

        if let Some(sequence) = event.sequence() {
            if !state.admit_sequence(&key, sequence) {
                return;
            }
        }

        match event {
            FeedEvent::Quote(quote) => {
                if !quote.is_valid() {
                    warn!(stream = %key, state = ?quote.state(), "Dropping unusable quote");
                    metrics::FEED_EVENTS_DROPPED
                        .with_label_values(&["invalid_quote"])
                        .inc();
                    return;
                }
                state.quote = Some(quote);
            }
            FeedEvent::Trade(trade) => {
                state.trades.push_back(trade);
                while state.trades.len() > self.config.recent_trade_depth {
                    state.trades.pop_front();
                }
            }
            FeedEvent::Depth(depth) => {
                if !depth.is_well_formed() {
                    warn!(stream = %key, "Dropping malformed depth");
                    metrics::FEED_EVENTS_DROPPED
                        .with_label_values(&["malformed_depth"])
                        .inc();
                    return;
                }
                state.depth = Some(depth);
            }
            FeedEvent::Funding(funding) => {
                let newer = state
                    .funding
                    .as_ref()
                    .map(|f| funding.timestamp > f.timestamp)
                    .unwrap_or(true);
                if newer {
                    state.funding = Some(funding);
                }
            }
            FeedEvent::MarkPrice {
                price, timestamp, ..
            } => {
                state.mark_price = Some((price, timestamp));
            }
            FeedEvent::IndexPrice {
                price, timestamp, ..
            } => {
                state.index_price = Some((price, timestamp));
            }
        }
    }

    /// Latest retained quote for a stream, stale or not.
    pub fn latest_quote(&self, exchange: &ExchangeId, instrument: &InstrumentId) -> Option<Quote> {
        let key = StreamKey::new(exchange.clone(), instrument.clone());
        self.streams.get(&key).and_then(|e| e.read().quote.clone())
    }

    /// Latest mark price for a stream.
    pub fn mark_price(
        &self,
        exchange: &ExchangeId,
        instrument: &InstrumentId,
    ) -> Option<(Price, DateTime<Utc>)> {
        let key = StreamKey::new(exchange.clone(), instrument.clone());
        self.streams.get(&key).and_then(|e| e.read().mark_price)
    }

    /// Latest index price for a stream.
    pub fn index_price(
        &self,
        exchange: &ExchangeId,
        instrument: &InstrumentId,
    ) -> Option<(Price, DateTime<Utc>)> {
        let key = StreamKey::new(exchange.clone(), instrument.clone());
        self.streams.get(&key).and_then(|e| e.read().index_price)
    }

    /// Build an immutable snapshot as of `now`.
    ///
    /// Stale quotes are excluded per instrument. Fails with `FeedError::Stale`
    /// only when every known instrument is stale; an aggregator that has
    /// never seen a quote yields an empty snapshot.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> FeedResult<MarketSnapshot> {
        let budget = self.config.staleness_budget();

        let mut exchange_quotes: HashMap<InstrumentId, HashMap<ExchangeId, Quote>> = HashMap::new();
        let mut trades: HashMap<InstrumentId, Vec<Trade>> = HashMap::new();
        let mut depth: HashMap<InstrumentId, MarketDepth> = HashMap::new();
        let mut funding: HashMap<InstrumentId, FundingRate> = HashMap::new();
        let mut known_with_quote: HashSet<InstrumentId> = HashSet::new();

        for item in self.streams.iter() {
            let key = item.key().clone();
            let state = item.value().read();

            if let Some(quote) = &state.quote {
                known_with_quote.insert(key.instrument.clone());
                if !quote.is_stale_at(now, budget) {
                    exchange_quotes
                        .entry(key.instrument.clone())
                        .or_default()
                        .insert(key.exchange.clone(), quote.clone());
                }
            }
            if !state.trades.is_empty() {
                trades
                    .entry(key.instrument.clone())
                    .or_default()
                    .extend(state.trades.iter().cloned());
            }
            if let Some(d) = &state.depth {
                let replace = depth
                    .get(&key.instrument)
                    .map(|cur| d.timestamp > cur.timestamp)
                    .unwrap_or(true);
                if replace {
                    depth.insert(key.instrument.clone(), d.clone());
                }
            }
            if let Some(f) = &state.funding {
                let replace = funding
                    .get(&key.instrument)
                    .map(|cur| f.timestamp > cur.timestamp)
                    .unwrap_or(true);
                if replace {
                    funding.insert(key.instrument.clone(), f.clone());
                }
            }
        }
        if !known_with_quote.is_empty() && exchange_quotes.is_empty() {
            return Err(FeedError::Stale {
                known: known_with_quote.len(),
            });
        }

        // Merge and bound trades per instrument, oldest first.
        for list in trades.values_mut() {
            list.sort_by_key(|t| (t.timestamp, t.sequence));
            let excess = list.len().saturating_sub(self.config.recent_trade_depth);
            if excess > 0 {
                list.drain(..excess);
            }
        }

        // Best quote per instrument: tightest spread, ties by newest
        // timestamp, then exchange id for determinism.
        let mut quotes: HashMap<InstrumentId, Quote> = HashMap::new();
        let mut snapshot_time: Option<DateTime<Utc>> = None;
        for (instrument, venue_quotes) in &exchange_quotes {
            let best = venue_quotes
                .iter()
                .min_by(|(ex_a, a), (ex_b, b)| {
                    a.spread()
                        .cmp(&b.spread())
                        .then(b.timestamp.cmp(&a.timestamp))
                        .then(ex_a.cmp(ex_b))
                })
                .map(|(_, q)| q.clone());
            if let Some(best) = best {
                snapshot_time = Some(match snapshot_time {
                    Some(t) => t.max(best.timestamp),
                    None => best.timestamp,
                });
                quotes.insert(instrument.clone(), best);
            }
        }

        Ok(MarketSnapshot {
            quotes,
            exchange_quotes,
            recent_trades: trades,
            depth,
            funding_rates: funding,
            snapshot_time: snapshot_time.unwrap_or(now),
        })
    }

    /// Build a snapshot as of the current instant.
    pub fn snapshot(&self) -> FeedResult<MarketSnapshot> {
        self.snapshot_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use synth_core::Size;

    fn quote(instrument: &str, bid: &str, ask: &str, seq: u64) -> Quote {
        Quote::new(
            InstrumentId::from(instrument),
            bid.parse().unwrap(),
            ask.parse().unwrap(),
            Size::new(dec!(2)),
            Size::new(dec!(2)),
            Utc::now(),
            seq,
        )
    }

    fn aggregator() -> FeedAggregator {
        FeedAggregator::new(FeedConfig::default())
    }

    #[test]
    fn test_sequence_filtering() {
        let agg = aggregator();
        let ex = ExchangeId::from("binance");
        agg.apply(&ex, FeedEvent::Quote(quote("BTC/USD", "30000", "30010", 5)));
        // Equal and lower sequences are dropped.
        agg.apply(&ex, FeedEvent::Quote(quote("BTC/USD", "29000", "29010", 5)));
        agg.apply(&ex, FeedEvent::Quote(quote("BTC/USD", "28000", "28010", 4)));

        let q = agg
            .latest_quote(&ex, &InstrumentId::from("BTC/USD"))
            .unwrap();
        assert_eq!(q.bid_price, Price::new(dec!(30000)));

        // Strictly higher replaces, even across a gap.
        agg.apply(&ex, FeedEvent::Quote(quote("BTC/USD", "31000", "31010", 9)));
        let q = agg
            .latest_quote(&ex, &InstrumentId::from("BTC/USD"))
            .unwrap();
        assert_eq!(q.sequence, 9);
    }

    #[test]
    fn test_crossed_quote_dropped() {
        let agg = aggregator();
        let ex = ExchangeId::from("binance");
        agg.apply(&ex, FeedEvent::Quote(quote("BTC/USD", "30020", "30010", 1)));
        assert!(agg
            .latest_quote(&ex, &InstrumentId::from("BTC/USD"))
            .is_none());
    }

    #[test]
    fn test_best_quote_selection() {
        let agg = aggregator();
        // Wider spread on binance, tighter on okx.
        agg.apply(
            &ExchangeId::from("binance"),
            FeedEvent::Quote(quote("BTC/USD", "30000", "30020", 1)),
        );
        agg.apply(
            &ExchangeId::from("okx"),
            FeedEvent::Quote(quote("BTC/USD", "30002", "30012", 1)),
        );

        let snapshot = agg.snapshot().unwrap();
        let best = snapshot.quote(&InstrumentId::from("BTC/USD")).unwrap();
        assert_eq!(best.bid_price, Price::new(dec!(30002)));
        assert_eq!(snapshot.venues(&InstrumentId::from("BTC/USD")), 2);
    }

    #[test]
    fn test_stale_instrument_omitted_not_fatal() {
        let agg = aggregator();
        let ex = ExchangeId::from("binance");
        let mut old = quote("ETH/USD", "2000", "2002", 1);
        old.timestamp = Utc::now() - chrono::Duration::milliseconds(900);
        agg.apply(&ex, FeedEvent::Quote(old));
        agg.apply(&ex, FeedEvent::Quote(quote("BTC/USD", "30000", "30010", 1)));

        let snapshot = agg.snapshot().unwrap();
        assert!(snapshot.quote(&InstrumentId::from("BTC/USD")).is_some());
        assert!(snapshot.quote(&InstrumentId::from("ETH/USD")).is_none());
        // Stale quotes remain queryable.
        assert!(agg
            .latest_quote(&ex, &InstrumentId::from("ETH/USD"))
            .is_some());
    }

    #[test]
    fn test_all_stale_is_feed_stale() {
        let agg = aggregator();
        let ex = ExchangeId::from("binance");
        let mut old = quote("BTC/USD", "30000", "30010", 1);
        old.timestamp = Utc::now() - chrono::Duration::seconds(5);
        agg.apply(&ex, FeedEvent::Quote(old));

        match agg.snapshot() {
            Err(FeedError::Stale { known }) => assert_eq!(known, 1),
            other => panic!("expected FeedError::Stale, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_aggregator_yields_empty_snapshot() {
        let snapshot = aggregator().snapshot().unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_snapshot_time_is_max_timestamp() {
        let agg = aggregator();
        let t0 = Utc::now() - chrono::Duration::milliseconds(100);
        let mut q1 = quote("BTC/USD", "30000", "30010", 1);
        q1.timestamp = t0;
        let q2 = quote("ETH/USD", "2000", "2002", 1);
        let t2 = q2.timestamp;
        agg.apply(&ExchangeId::from("binance"), FeedEvent::Quote(q1));
        agg.apply(&ExchangeId::from("binance"), FeedEvent::Quote(q2));

        let snapshot = agg.snapshot().unwrap();
        assert_eq!(snapshot.snapshot_time, t2);
    }

    #[test]
    fn test_trades_bounded_and_ordered() {
        let config = FeedConfig {
            recent_trade_depth: 3,
            ..FeedConfig::default()
        };
        let agg = FeedAggregator::new(config);
        let ex = ExchangeId::from("binance");
        for i in 0..5u64 {
            agg.apply(
                &ex,
                FeedEvent::Trade(Trade {
                    instrument: InstrumentId::from("BTC/USD"),
                    price: Price::new(dec!(30000)),
                    size: Size::new(dec!(1)),
                    side: synth_core::Side::Buy,
                    timestamp: Utc::now(),
                    sequence: i + 1,
                    trade_id: format!("t{i}"),
                }),
            );
        }
        agg.apply(&ex, FeedEvent::Quote(quote("BTC/USD", "30000", "30010", 100)));

        let snapshot = agg.snapshot().unwrap();
        let trades = snapshot.trades(&InstrumentId::from("BTC/USD"));
        assert_eq!(trades.len(), 3);
        assert_eq!(trades.last().unwrap().trade_id, "t4");
    }
}
