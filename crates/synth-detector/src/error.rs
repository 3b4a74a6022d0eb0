//! Detector error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Invalid detector configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Model(#[from] synth_pricing::ModelError),
}

pub type DetectorResult<T> = Result<T, DetectorError>;
