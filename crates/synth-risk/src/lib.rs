//! Exposure and sizing.
//!
//! Position sizing takes the minimum over Kelly, VaR-bounded,
//! volatility-targeted and — when the caller supplies per-leg vols for a
//! multi-leg package — risk-parity candidates, then applies leverage and
//! correlation adjustments. The portfolio aggregates exposures,
//! parametric VaR, rolling Sharpe and limit breaches.

pub mod error;
pub mod params;
pub mod portfolio;
pub mod sizing;

pub use error::{RiskError, RiskResult};
pub use params::RiskParameters;
pub use portfolio::{Portfolio, Position, RiskBreach};
pub use sizing::{PositionSizer, SizingInputs};
