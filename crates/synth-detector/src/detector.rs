//! The shared detector contract and common plumbing.
//!
//! `DetectorCore` carries what every detector owns: parameters, the active
//! opportunity list, callbacks, and the expiry sweep. Concrete detectors
//! embed it and implement only their detection logic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use synth_core::{MarketSnapshot, MispricingOpportunity};
use synth_telemetry::metrics;

use crate::params::DetectionParameters;

/// Callback invoked with an emitted or expiring opportunity.
pub type DetectionCallback = Arc<dyn Fn(&MispricingOpportunity) + Send + Sync>;

/// Contract shared by every mispricing detector.
pub trait MispricingDetector: Send {
    fn name(&self) -> &'static str;

    /// Absorb a new snapshot: update histories and sweep expired
    /// opportunities. Never emits.
    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>);

    /// Run one detection pass over the most recent snapshot.
    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity>;

    fn set_parameters(&mut self, params: DetectionParameters);

    fn set_detection_callback(&mut self, callback: DetectionCallback);

    fn set_expiry_callback(&mut self, callback: DetectionCallback);

    /// Defensive copy of the currently active (unexpired) opportunities.
    fn active_opportunities(&self) -> Vec<MispricingOpportunity>;
}

/// State common to all detectors.
pub struct DetectorCore {
    pub params: DetectionParameters,
    active: Vec<MispricingOpportunity>,
    on_detection: Option<DetectionCallback>,
    on_expiry: Option<DetectionCallback>,
}

impl DetectorCore {
    /// Freshness budget used for confidence scoring, matching the feed
    /// staleness default.
    pub const FRESHNESS_BUDGET_MS: u64 = 500;

    pub fn new(params: DetectionParameters) -> Self {
        Self {
            params,
            active: Vec::new(),
            on_detection: None,
            on_expiry: None,
        }
    }

    pub fn set_parameters(&mut self, params: DetectionParameters) {
        self.params = params;
    }

    pub fn set_detection_callback(&mut self, callback: DetectionCallback) {
        self.on_detection = Some(callback);
    }

    pub fn set_expiry_callback(&mut self, callback: DetectionCallback) {
        self.on_expiry = Some(callback);
    }

    pub fn active(&self) -> Vec<MispricingOpportunity> {
        self.active.clone()
    }

    /// The significance gate: deviation, z-score and confidence must all
    /// clear their thresholds. Failed candidates are counted by reason.
    pub fn passes_gate(&self, deviation: f64, z_score: f64, confidence: f64) -> bool {
        if deviation.abs() <= self.params.min_deviation_threshold {
            metrics::OPPORTUNITIES_SKIPPED
                .with_label_values(&["below_threshold"])
                .inc();
            return false;
        }
        if z_score.abs() <= self.params.min_z_score {
            metrics::OPPORTUNITIES_SKIPPED
                .with_label_values(&["low_z_score"])
                .inc();
            return false;
        }
        if confidence <= self.params.min_confidence_level {
            metrics::OPPORTUNITIES_SKIPPED
                .with_label_values(&["low_confidence"])
                .inc();
            return false;
        }
        true
    }

    /// Record an emission: track it, count it, fire the callback.
    pub fn emit(&mut self, opportunity: MispricingOpportunity) -> MispricingOpportunity {
        info!(
            target_instrument = %opportunity.target,
            kind = %opportunity.kind,
            severity = %opportunity.severity,
            deviation_pct = opportunity.deviation_pct,
            z_score = opportunity.z_score,
            "Mispricing detected"
        );
        metrics::MISPRICINGS_DETECTED
            .with_label_values(&[
                &opportunity.kind.to_string(),
                &opportunity.severity.to_string(),
            ])
            .inc();
        if let Some(cb) = &self.on_detection {
            cb(&opportunity);
        }
        self.active.push(opportunity.clone());
        opportunity
    }

    /// Drop expired opportunities, firing the expiry callback exactly once
    /// per opportunity (removal guarantees no refire on later sweeps).
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) {
        let mut kept = Vec::with_capacity(self.active.len());
        for opportunity in self.active.drain(..) {
            if opportunity.is_expired_at(now) {
                debug!(
                    target_instrument = %opportunity.target,
                    kind = %opportunity.kind,
                    "Opportunity expired"
                );
                metrics::OPPORTUNITIES_EXPIRED.inc();
                if let Some(cb) = &self.on_expiry {
                    cb(&opportunity);
                }
            } else {
                kept.push(opportunity);
            }
        }
        self.active = kept;
    }

    /// Count a skipped candidate.
    pub fn skip(reason: &'static str) {
        metrics::OPPORTUNITIES_SKIPPED
            .with_label_values(&[reason])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use synth_core::{InstrumentId, MispricingKind, Price};

    fn opportunity(ttl: Duration) -> MispricingOpportunity {
        MispricingOpportunity::new(
            InstrumentId::from("BTC-PERP"),
            vec![InstrumentId::from("BTC/USD")],
            vec![1.0],
            MispricingKind::Basis,
            Price::new(dec!(30200)),
            Price::new(dec!(30015)),
            0.0062,
            2.5,
            0.9,
            ttl,
        )
    }

    #[test]
    fn test_gate_requires_all_three() {
        let core = DetectorCore::new(DetectionParameters::default());
        assert!(core.passes_gate(0.006, 2.5, 0.9));
        assert!(!core.passes_gate(0.004, 2.5, 0.9));
        assert!(!core.passes_gate(0.006, 1.5, 0.9));
        assert!(!core.passes_gate(0.006, 2.5, 0.7));
        // Negative deviations gate on magnitude.
        assert!(core.passes_gate(-0.006, -2.5, 0.9));
    }

    #[test]
    fn test_expiry_fires_exactly_once() {
        let mut core = DetectorCore::new(DetectionParameters::default());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        core.set_expiry_callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        core.emit(opportunity(Duration::milliseconds(1)));
        assert_eq!(core.active().len(), 1);

        let later = Utc::now() + Duration::seconds(1);
        core.sweep_expired(later);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(core.active().is_empty());

        // A second sweep must not refire.
        core.sweep_expired(later + Duration::seconds(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detection_callback_fires() {
        let mut core = DetectorCore::new(DetectionParameters::default());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        core.set_detection_callback(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        core.emit(opportunity(Duration::minutes(30)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
