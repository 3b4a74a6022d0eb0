//! Application shell for the synthetic pricing pipeline.
//!
//! Loads configuration, assembles the feed aggregator, pricing models,
//! detectors and the arbitrage engine, and drives them on the snapshot
//! tick. The core crates never depend on anything in here.

pub mod app;
pub mod config;
pub mod error;

pub use app::Pipeline;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
