//! Application configuration.
//!
//! Loaded from a TOML file via the `config` crate; every section falls
//! back to its documented defaults, so an empty file is a valid
//! configuration.

use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use synth_detector::DetectionParameters;
use synth_engine::ArbitrageParameters;
use synth_feed::FeedConfig;
use synth_pricing::ModelParameters;
use synth_risk::RiskParameters;

use crate::error::{AppError, AppResult};

/// One configured currency triangle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleConfig {
    pub name: String,
    /// A/B, B/C, A/C pair ids.
    pub pair_ab: String,
    pub pair_bc: String,
    pub pair_ac: String,
}

/// One configured spot/derivative basis pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasisPairConfig {
    pub spot: String,
    pub derivative: String,
}

/// Per-exchange taker fee in basis points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeFeeConfig {
    pub exchange: String,
    pub taker_fee_bps: u32,
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub models: ModelParameters,
    #[serde(default)]
    pub detection: DetectionParameters,
    #[serde(default)]
    pub arbitrage: ArbitrageParameters,
    #[serde(default)]
    pub risk: RiskParameters,
    /// Starting portfolio value for sizing, in quote currency.
    #[serde(default = "default_portfolio_value")]
    pub portfolio_value: f64,
    #[serde(default)]
    pub triangles: Vec<TriangleConfig>,
    #[serde(default)]
    pub basis_pairs: Vec<BasisPairConfig>,
    #[serde(default)]
    pub exchange_fees: Vec<ExchangeFeeConfig>,
}

fn default_portfolio_value() -> f64 {
    1_000_000.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            models: ModelParameters::default(),
            detection: DetectionParameters::default(),
            arbitrage: ArbitrageParameters::default(),
            risk: RiskParameters::default(),
            portfolio_value: default_portfolio_value(),
            triangles: Vec::new(),
            basis_pairs: Vec::new(),
            exchange_fees: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, falling back to defaults per field.
    pub fn load(path: &Path) -> AppResult<Self> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration problems at startup are the only fatal errors.
    pub fn validate(&self) -> AppResult<()> {
        self.detection.validate()?;
        self.risk.validate()?;
        if self.portfolio_value <= 0.0 {
            return Err(AppError::Config(
                "portfolio_value must be positive".into(),
            ));
        }
        for triangle in &self.triangles {
            for pair in [&triangle.pair_ab, &triangle.pair_bc, &triangle.pair_ac] {
                if !pair.contains('/') {
                    return Err(AppError::Config(format!(
                        "triangle {} leg {pair} is not a currency pair",
                        triangle.name
                    )));
                }
            }
        }
        Ok(())
    }
}
