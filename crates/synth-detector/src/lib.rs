//! Mispricing detectors.
//!
//! Six detectors share the `MispricingDetector` contract: statistical,
//! triangular, volatility, basis, cross-exchange, and spot-vs-derivative.
//! A composite detector fans updates out to its children and consolidates
//! their findings.

pub mod basis;
pub mod composite;
pub mod cross_exchange;
pub mod detector;
pub mod error;
pub mod params;
pub mod spot_derivative;
pub mod statistical;
pub mod triangular;
pub mod volatility;

pub use basis::{BasisDetector, BasisPair};
pub use composite::CompositeDetector;
pub use cross_exchange::{CrossExchangeDetector, CrossExchangeOpportunity};
pub use detector::{DetectionCallback, DetectorCore, MispricingDetector};
pub use error::{DetectorError, DetectorResult};
pub use params::DetectionParameters;
pub use spot_derivative::SpotDerivativeDetector;
pub use statistical::StatisticalDetector;
pub use triangular::{Triangle, TriangularDetector};
pub use volatility::VolatilityDetector;
