//! Pricing model error types.

use synth_core::InstrumentId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    /// Inputs outside the model's domain (negative maturity,
    /// non-positive vol, zero prices).
    #[error("Model domain error: {0}")]
    Domain(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),

    #[error("Insufficient history for {instrument}: {have}/{need} observations")]
    InsufficientHistory {
        instrument: InstrumentId,
        have: usize,
        need: usize,
    },

    #[error(transparent)]
    Core(#[from] synth_core::CoreError),
}

pub type ModelResult<T> = Result<T, ModelError>;
