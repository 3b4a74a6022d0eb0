//! Market-data fan-in layer.
//!
//! Merges ordered per-exchange event streams into immutable
//! `MarketSnapshot`s with well-defined sequencing and staleness semantics,
//! and publishes them latest-wins through a watch channel.

pub mod aggregator;
pub mod error;
pub mod event;
pub mod publisher;

pub use aggregator::{FeedAggregator, FeedConfig};
pub use error::{FeedError, FeedResult};
pub use event::FeedEvent;
pub use publisher::SnapshotPublisher;
