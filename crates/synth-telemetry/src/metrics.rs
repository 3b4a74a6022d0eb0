//! Prometheus metrics for the pricing/detection pipeline.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally: a registration
//! failure means duplicate metric names, which is a fatal configuration
//! error best caught at startup. These panics only occur during static
//! initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, IntCounter,
    IntGauge,
};

/// Total snapshots published by the feed aggregator.
pub static SNAPSHOTS_PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "synth_snapshots_published_total",
        "Total market snapshots published"
    )
    .unwrap()
});

/// Feed events dropped before entering a snapshot.
/// Labels: reason (stale_sequence/invalid_quote/malformed_depth)
pub static FEED_EVENTS_DROPPED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "synth_feed_events_dropped_total",
        "Feed events dropped before snapshot inclusion",
        &["reason"]
    )
    .unwrap()
});

/// Per-stream sequence gaps observed (event still processed).
pub static SEQUENCE_GAPS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "synth_sequence_gaps_total",
        "Sequence number gaps observed across feed streams"
    )
    .unwrap()
});

/// Detector passes skipped because every known instrument was stale.
pub static STALE_FEED_PASSES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "synth_stale_feed_passes_total",
        "Detection passes skipped due to a fully stale feed"
    )
    .unwrap()
});

/// Mispricings emitted by detectors.
/// Labels: kind, severity
pub static MISPRICINGS_DETECTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "synth_mispricings_detected_total",
        "Mispricing opportunities emitted by detectors",
        &["kind", "severity"]
    )
    .unwrap()
});

/// Opportunities skipped, by reason.
/// Labels: reason (insufficient_history/model_domain/unknown_instrument/
/// wide_spread/low_confidence/below_threshold)
pub static OPPORTUNITIES_SKIPPED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "synth_opportunities_skipped_total",
        "Candidate opportunities skipped before emission",
        &["reason"]
    )
    .unwrap()
});

/// Arbitrage opportunities that passed all validation checks.
pub static OPPORTUNITIES_VALIDATED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "synth_opportunities_validated_total",
        "Arbitrage opportunities promoted to validated"
    )
    .unwrap()
});

/// Validation failures by failing check.
/// Labels: check (liquidity/risk/timing/feasibility)
pub static VALIDATION_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "synth_validation_failures_total",
        "Arbitrage validation failures by check",
        &["check"]
    )
    .unwrap()
});

/// Opportunities expired by the sweep.
pub static OPPORTUNITIES_EXPIRED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "synth_opportunities_expired_total",
        "Arbitrage opportunities transitioned to expired"
    )
    .unwrap()
});

/// Currently active (non-terminal) arbitrage opportunities.
pub static ACTIVE_OPPORTUNITIES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "synth_active_opportunities",
        "Active arbitrage opportunities held by the engine"
    )
    .unwrap()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        SNAPSHOTS_PUBLISHED.inc();
        FEED_EVENTS_DROPPED.with_label_values(&["stale_sequence"]).inc();
        MISPRICINGS_DETECTED
            .with_label_values(&["basis", "low"])
            .inc();
        OPPORTUNITIES_SKIPPED
            .with_label_values(&["insufficient_history"])
            .inc();
        ACTIVE_OPPORTUNITIES.set(3);
        assert!(SNAPSHOTS_PUBLISHED.get() >= 1);
    }
}
