//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Every known instrument exceeded the staleness budget.
    #[error("Feed stale: all {known} known instruments exceed the staleness budget")]
    Stale { known: usize },

    #[error("Invalid quote for {0}: {1}")]
    InvalidQuote(String, String),

    #[error("Malformed depth for {0}")]
    MalformedDepth(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
