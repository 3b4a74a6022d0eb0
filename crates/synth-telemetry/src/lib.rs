//! Observability for the synthetic pricing engine.
//!
//! Structured logging via `tracing` and Prometheus counters for the
//! pipeline: snapshots published, events dropped, sequence gaps, detected
//! and skipped opportunities, validation failures.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
