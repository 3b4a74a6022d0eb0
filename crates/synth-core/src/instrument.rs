//! Exchange and instrument identity.
//!
//! Instrument ids are opaque strings that become globally unique when
//! combined with an exchange tag; `StreamKey` is the per-stream sequencing
//! key used by the feed layer.

use crate::{Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange identifier (e.g., "binance", "okx").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(pub String);

impl ExchangeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Canonical instrument identifier (e.g., "BTC/USD", "BTC-PERP").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a pair symbol into (base, quote), e.g. "BTC/USD" -> ("BTC", "USD").
    ///
    /// Returns `None` for ids that are not slash-separated pairs.
    pub fn as_pair(&self) -> Option<(&str, &str)> {
        let (base, quote) = self.0.split_once('/')?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some((base, quote))
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Per-stream key: one ordered event stream exists per (exchange, instrument).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    pub exchange: ExchangeId,
    pub instrument: InstrumentId,
}

impl StreamKey {
    pub fn new(exchange: ExchangeId, instrument: InstrumentId) -> Self {
        Self {
            exchange,
            instrument,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.instrument)
    }
}

/// Instrument classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Spot,
    Forward,
    Future,
    Perpetual,
    Option,
    Swap,
}

impl InstrumentKind {
    /// Derivatives carry expiry (and for options, strike) metadata.
    pub fn is_derivative(&self) -> bool {
        !matches!(self, Self::Spot)
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spot => "spot",
            Self::Forward => "forward",
            Self::Future => "future",
            Self::Perpetual => "perpetual",
            Self::Option => "option",
            Self::Swap => "swap",
        };
        write!(f, "{s}")
    }
}

/// Static instrument definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub kind: InstrumentKind,
    /// Minimum price increment.
    pub tick_size: Price,
    /// Minimum order size.
    pub min_size: Size,
    /// Expiry, for dated derivatives.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    /// Strike, for options.
    #[serde(default)]
    pub strike: Option<Price>,
}

impl Instrument {
    pub fn spot(id: InstrumentId, tick_size: Price, min_size: Size) -> Self {
        Self {
            id,
            kind: InstrumentKind::Spot,
            tick_size,
            min_size,
            expiry: None,
            strike: None,
        }
    }

    pub fn perpetual(id: InstrumentId, tick_size: Price, min_size: Size) -> Self {
        Self {
            id,
            kind: InstrumentKind::Perpetual,
            tick_size,
            min_size,
            expiry: None,
            strike: None,
        }
    }

    pub fn future(
        id: InstrumentId,
        tick_size: Price,
        min_size: Size,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: InstrumentKind::Future,
            tick_size,
            min_size,
            expiry: Some(expiry),
            strike: None,
        }
    }

    pub fn option(
        id: InstrumentId,
        tick_size: Price,
        min_size: Size,
        expiry: DateTime<Utc>,
        strike: Price,
    ) -> Self {
        Self {
            id,
            kind: InstrumentKind::Option,
            tick_size,
            min_size,
            expiry: Some(expiry),
            strike: Some(strike),
        }
    }

    /// Time to expiry in years from `now`, if the instrument is dated.
    ///
    /// Negative values are returned as-is; callers decide whether an
    /// expired instrument is a domain error.
    pub fn time_to_expiry_years(&self, now: DateTime<Utc>) -> Option<f64> {
        const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;
        self.expiry
            .map(|e| (e - now).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_YEAR)
    }
}
