//! Normalized feed events.
//!
//! Exchange adapters deliver these already decoded; the aggregator only
//! merges them. Tickers normalize to `Quote`, L2 book snapshots and deltas
//! to `Depth`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use synth_core::{FundingRate, InstrumentId, MarketDepth, Price, Quote, Trade};

/// One normalized event on a per-exchange stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FeedEvent {
    Quote(Quote),
    Trade(Trade),
    Depth(MarketDepth),
    Funding(FundingRate),
    MarkPrice {
        instrument: InstrumentId,
        price: Price,
        timestamp: DateTime<Utc>,
        sequence: u64,
    },
    IndexPrice {
        instrument: InstrumentId,
        price: Price,
        timestamp: DateTime<Utc>,
        sequence: u64,
    },
}

impl FeedEvent {
    pub fn instrument(&self) -> &InstrumentId {
        match self {
            Self::Quote(q) => &q.instrument,
            Self::Trade(t) => &t.instrument,
            Self::Depth(d) => &d.instrument,
            Self::Funding(f) => &f.instrument,
            Self::MarkPrice { instrument, .. } | Self::IndexPrice { instrument, .. } => instrument,
        }
    }

    /// Per-stream sequence, when the event kind carries one.
    ///
    /// Funding rates are ordered by timestamp only.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Self::Quote(q) => Some(q.sequence),
            Self::Trade(t) => Some(t.sequence),
            Self::Depth(_) | Self::Funding(_) => None,
            Self::MarkPrice { sequence, .. } | Self::IndexPrice { sequence, .. } => Some(*sequence),
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Quote(_) => "quote",
            Self::Trade(_) => "trade",
            Self::Depth(_) => "depth",
            Self::Funding(_) => "funding",
            Self::MarkPrice { .. } => "mark_price",
            Self::IndexPrice { .. } => "index_price",
        }
    }
}
