//! Synthetic pricing models.
//!
//! Six models share the `PricingModel` contract: perpetual basis,
//! cost-of-carry forwards, Black–Scholes options on a vol surface,
//! cross-currency synthesis, statistical mean reversion, and weighted
//! baskets. Quoted prices stay in `Decimal`; model mathematics runs in
//! `f64` behind the conversion helpers on `Price`.

pub mod basket;
pub mod carry;
pub mod confidence;
pub mod cross_currency;
pub mod error;
pub mod history;
pub mod model;
pub mod options;
pub mod perpetual;
pub mod statistical;

pub use basket::BasketModel;
pub use carry::{CarryRates, CostOfCarryModel};
pub use confidence::{confidence_score, freshness_score, sample_score, spread_score};
pub use cross_currency::CrossCurrencyModel;
pub use error::{ModelError, ModelResult};
pub use history::PriceHistory;
pub use model::{ModelParameters, PricingModel};
pub use options::{black_scholes, Greeks, OptionPricingModel};
pub use perpetual::PerpetualBasisModel;
pub use statistical::StatArbModel;
