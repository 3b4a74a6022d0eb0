//! Core domain types for the synthetic pricing and arbitrage engine.
//!
//! This crate provides the market model shared by every other crate:
//! - `ExchangeId`, `InstrumentId`, `StreamKey`: identity types
//! - `Price`, `Size`: precision-safe numeric types
//! - `Quote`, `Trade`, `MarketDepth`, `FundingRate`: market events
//! - `VolatilitySurface`: implied volatility grid with interpolation
//! - `MarketSnapshot`: immutable point-in-time composite
//! - `SyntheticPrice`, `MispricingOpportunity`: model and detector outputs

pub mod decimal;
pub mod error;
pub mod instrument;
pub mod market;
pub mod mispricing;
pub mod snapshot;
pub mod surface;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use instrument::{ExchangeId, Instrument, InstrumentId, InstrumentKind, StreamKey};
pub use market::{DepthLevel, FundingRate, MarketDepth, Quote, QuoteState, Side, Trade};
pub use mispricing::{MispricingKind, MispricingOpportunity, Severity, SyntheticPrice};
pub use snapshot::MarketSnapshot;
pub use surface::VolatilitySurface;
