//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigLoad(#[from] config::ConfigError),

    #[error(transparent)]
    Detector(#[from] synth_detector::DetectorError),

    #[error(transparent)]
    Risk(#[from] synth_risk::RiskError),

    #[error(transparent)]
    Telemetry(#[from] synth_telemetry::TelemetryError),
}

pub type AppResult<T> = Result<T, AppError>;
