//! Error types for synth-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid quote: {0}")]
    InvalidQuote(String),

    #[error("Invalid surface point: {0}")]
    InvalidSurfacePoint(String),

    #[error("Component/weight mismatch: {components} components, {weights} weights")]
    ComponentMismatch { components: usize, weights: usize },

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
