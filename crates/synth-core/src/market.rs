//! Market event types: quotes, trades, depth, funding.

use crate::{InstrumentId, Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Trade / leg side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Quote quality classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteState {
    /// Both sides present, bid <= ask.
    Valid,
    /// No bid side (zero price or size).
    NoBid,
    /// No ask side (zero price or size).
    NoAsk,
    /// Both sides missing.
    Empty,
    /// Crossed book (bid > ask).
    Crossed,
}

impl QuoteState {
    /// Whether the quote may enter a published snapshot.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Top-of-book quote for one instrument on one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub instrument: InstrumentId,
    pub bid_price: Price,
    pub ask_price: Price,
    pub bid_size: Size,
    pub ask_size: Size,
    pub timestamp: DateTime<Utc>,
    /// Monotonically non-decreasing per (exchange, instrument).
    pub sequence: u64,
}

impl Quote {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instrument: InstrumentId,
        bid_price: Price,
        ask_price: Price,
        bid_size: Size,
        ask_size: Size,
        timestamp: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        Self {
            instrument,
            bid_price,
            ask_price,
            bid_size,
            ask_size,
            timestamp,
            sequence,
        }
    }

    pub fn state(&self) -> QuoteState {
        let has_bid = self.bid_price.is_positive() && self.bid_size.is_positive();
        let has_ask = self.ask_price.is_positive() && self.ask_size.is_positive();
        match (has_bid, has_ask) {
            (false, false) => QuoteState::Empty,
            (true, false) => QuoteState::NoAsk,
            (false, true) => QuoteState::NoBid,
            (true, true) => {
                if self.bid_price <= self.ask_price {
                    QuoteState::Valid
                } else {
                    QuoteState::Crossed
                }
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state().is_usable()
    }

    pub fn mid(&self) -> Price {
        Price::mid_of(self.bid_price, self.ask_price)
    }

    pub fn spread(&self) -> Price {
        self.ask_price - self.bid_price
    }

    /// Spread as a fraction of mid (detectors gate on this).
    pub fn spread_ratio(&self) -> Option<f64> {
        let mid = self.mid();
        if mid.is_zero() {
            return None;
        }
        Some(self.spread().to_f64() / mid.to_f64())
    }

    /// Age relative to a reference instant.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }

    /// True when older than the given budget at `now`.
    pub fn is_stale_at(&self, now: DateTime<Utc>, budget: Duration) -> bool {
        self.age_at(now) > budget
    }

    /// Size available to a taker on the given side.
    ///
    /// A buyer consumes ask liquidity, a seller bid liquidity.
    pub fn taker_liquidity(&self, side: Side) -> Size {
        match side {
            Side::Buy => self.ask_size,
            Side::Sell => self.bid_size,
        }
    }

    /// Price a taker pays/receives on the given side.
    pub fn taker_price(&self, side: Side) -> Price {
        match side {
            Side::Buy => self.ask_price,
            Side::Sell => self.bid_price,
        }
    }
}

/// Executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub instrument: InstrumentId,
    pub price: Price,
    pub size: Size,
    pub side: Side,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    /// Unique per exchange.
    pub trade_id: String,
}

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    pub size: Size,
}

impl DepthLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }
}

/// Level-2 order book for one instrument.
///
/// `bids` descend in price, `asks` ascend; every level has positive size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub instrument: InstrumentId,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub timestamp: DateTime<Utc>,
}

impl MarketDepth {
    pub fn new(
        instrument: InstrumentId,
        bids: Vec<DepthLevel>,
        asks: Vec<DepthLevel>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument,
            bids,
            asks,
            timestamp,
        }
    }

    pub fn best_bid(&self) -> Option<&DepthLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&DepthLevel> {
        self.asks.first()
    }

    /// Top-of-book size opposing a taker order on `side`.
    pub fn top_liquidity(&self, side: Side) -> Size {
        match side {
            Side::Buy => self.best_ask().map(|l| l.size).unwrap_or(Size::ZERO),
            Side::Sell => self.best_bid().map(|l| l.size).unwrap_or(Size::ZERO),
        }
    }

    /// Validate level ordering and positive sizes.
    pub fn is_well_formed(&self) -> bool {
        let sizes_ok = self
            .bids
            .iter()
            .chain(self.asks.iter())
            .all(|l| l.size.is_positive());
        let bids_ok = self.bids.windows(2).all(|w| w[0].price > w[1].price);
        let asks_ok = self.asks.windows(2).all(|w| w[0].price < w[1].price);
        sizes_ok && bids_ok && asks_ok
    }
}

/// Periodic funding payment anchoring a perpetual to spot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRate {
    pub instrument: InstrumentId,
    /// Per-interval rate as quoted (0.0005 = 5 bp per interval).
    pub rate: rust_decimal::Decimal,
    pub timestamp: DateTime<Utc>,
    /// Funding interval.
    pub interval: Duration,
}

impl FundingRate {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(8 * 3600);

    pub fn new(instrument: InstrumentId, rate: rust_decimal::Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            instrument,
            rate,
            timestamp,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> Quote {
        Quote::new(
            InstrumentId::from("BTC/USD"),
            Price::new(bid),
            Price::new(ask),
            Size::new(dec!(1)),
            Size::new(dec!(1)),
            Utc::now(),
            1,
        )
    }

    #[test]
    fn test_quote_states() {
        assert_eq!(quote(dec!(100), dec!(101)).state(), QuoteState::Valid);
        assert_eq!(quote(dec!(101), dec!(100)).state(), QuoteState::Crossed);
        assert_eq!(quote(dec!(0), dec!(100)).state(), QuoteState::NoBid);
        assert_eq!(quote(dec!(100), dec!(0)).state(), QuoteState::NoAsk);
        assert_eq!(quote(dec!(0), dec!(0)).state(), QuoteState::Empty);
    }

    #[test]
    fn test_spread_ratio() {
        let q = quote(dec!(30000), dec!(30010));
        let ratio = q.spread_ratio().unwrap();
        assert!((ratio - 10.0 / 30005.0).abs() < 1e-9);
    }

    #[test]
    fn test_staleness() {
        let mut q = quote(dec!(100), dec!(101));
        q.timestamp = Utc::now() - chrono::Duration::milliseconds(600);
        assert!(q.is_stale_at(Utc::now(), Duration::from_millis(500)));
        assert!(!q.is_stale_at(Utc::now(), Duration::from_millis(1000)));
    }

    #[test]
    fn test_taker_sides() {
        let q = quote(dec!(100), dec!(101));
        assert_eq!(q.taker_price(Side::Buy), Price::new(dec!(101)));
        assert_eq!(q.taker_price(Side::Sell), Price::new(dec!(100)));
    }

    #[test]
    fn test_depth_ordering() {
        let depth = MarketDepth::new(
            InstrumentId::from("BTC/USD"),
            vec![
                DepthLevel::new(Price::new(dec!(100)), Size::new(dec!(2))),
                DepthLevel::new(Price::new(dec!(99)), Size::new(dec!(5))),
            ],
            vec![
                DepthLevel::new(Price::new(dec!(101)), Size::new(dec!(1))),
                DepthLevel::new(Price::new(dec!(102)), Size::new(dec!(4))),
            ],
            Utc::now(),
        );
        assert!(depth.is_well_formed());
        assert_eq!(depth.top_liquidity(Side::Buy), Size::new(dec!(1)));
        assert_eq!(depth.top_liquidity(Side::Sell), Size::new(dec!(2)));

        let mut bad = depth.clone();
        bad.bids.reverse();
        assert!(!bad.is_well_formed());
    }
}
