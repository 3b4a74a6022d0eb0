//! Engine error types.

use synth_core::InstrumentId;
use thiserror::Error;

/// The validation check an opportunity failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Opposing-side depth cannot absorb a leg.
    Liquidity,
    /// Profit, VaR, correlation or impact limit violated.
    Risk,
    /// Expired or too little execution headroom remains.
    Timing,
    /// Position size or slippage limits exceeded.
    Feasibility,
}

impl ValidationFailure {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Liquidity => "liquidity",
            Self::Risk => "risk",
            Self::Timing => "timing",
            Self::Feasibility => "feasibility",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed ({}): {detail}", check.label())]
    Validation {
        check: ValidationFailure,
        detail: String,
    },

    #[error("Mispricing confidence {confidence} below threshold")]
    LowConfidence { confidence: f64 },

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),

    #[error("Sized to zero: {0}")]
    ZeroSize(String),

    #[error("Unknown opportunity id: {0}")]
    UnknownOpportunity(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
