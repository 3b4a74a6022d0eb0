//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Invalid risk configuration: {0}")]
    Config(String),

    #[error("Unknown position: {0}")]
    UnknownPosition(String),
}

pub type RiskResult<T> = Result<T, RiskError>;
