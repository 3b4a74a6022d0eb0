//! Statistical mispricing detector.
//!
//! Tracks bounded queues of recent mids and deviations per instrument.
//! The deviation of the current mid from its rolling mean is z-scored
//! against the deviation history; significant excursions are emitted as
//! mean-reversion opportunities.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rust_decimal::Decimal;

use synth_core::{InstrumentId, MarketSnapshot, MispricingKind, MispricingOpportunity, Price, Side};
use synth_pricing::confidence_score;

use crate::detector::{DetectionCallback, DetectorCore, MispricingDetector};
use crate::params::DetectionParameters;

/// Bounded series with O(1) push.
#[derive(Debug, Default)]
struct BoundedSeries {
    values: VecDeque<f64>,
}

impl BoundedSeries {
    fn push(&mut self, value: f64, capacity: usize) {
        self.values.push_back(value);
        while self.values.len() > capacity {
            self.values.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Unbiased sample standard deviation.
    fn std_dev(&self) -> Option<f64> {
        if self.values.len() < 2 {
            return None;
        }
        let mean = self.mean()?;
        let var = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / (self.values.len() - 1) as f64;
        Some(var.sqrt())
    }

    fn z_score(&self, value: f64) -> Option<f64> {
        let mean = self.mean()?;
        let std = self.std_dev()?;
        if std <= f64::EPSILON {
            return None;
        }
        Some((value - mean) / std)
    }
}

/// Detects statistically significant excursions from the rolling mean.
pub struct StatisticalDetector {
    core: DetectorCore,
    snapshot: Option<Arc<MarketSnapshot>>,
    mids: HashMap<InstrumentId, BoundedSeries>,
    deviations: HashMap<InstrumentId, BoundedSeries>,
}

impl StatisticalDetector {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            core: DetectorCore::new(params),
            snapshot: None,
            mids: HashMap::new(),
            deviations: HashMap::new(),
        }
    }

    fn check_instrument(&self, instrument: &InstrumentId) -> Option<MispricingOpportunity> {
        let snapshot = self.snapshot.as_ref()?;
        let quote = snapshot.quote(instrument)?;
        let params = &self.core.params;

        let mids = self.mids.get(instrument)?;
        let deviations = self.deviations.get(instrument)?;
        if deviations.len() < params.min_observation_window {
            DetectorCore::skip("insufficient_history");
            return None;
        }
        if quote.spread_ratio().unwrap_or(f64::INFINITY) > params.max_spread_ratio {
            DetectorCore::skip("wide_spread");
            return None;
        }

        let mid = quote.mid().to_f64();
        let mean = mids.mean()?;
        if mean <= 0.0 {
            return None;
        }
        let deviation = (mid - mean) / mean;
        let z_score = deviations.z_score(deviation)?;
        let confidence = confidence_score(
            &[quote],
            snapshot.snapshot_time,
            DetectorCore::FRESHNESS_BUDGET_MS,
            params.max_spread_ratio,
            (deviations.len() as f64 / params.history_capacity() as f64).min(1.0),
        );

        if !self.core.passes_gate(deviation, z_score, confidence) {
            return None;
        }

        let theoretical = Price::from_f64(mean)?;
        let observed = quote.mid();
        // Mean reversion: the edge per unit is the distance back to the
        // mean, bounded by what the book can absorb at the top.
        let reversion_side = if deviation > 0.0 { Side::Sell } else { Side::Buy };
        let available = quote.taker_liquidity(reversion_side);
        let per_unit = (observed.inner() - theoretical.inner()).abs();
        let expected_profit = per_unit * available.inner();
        let max_loss = quote.spread().inner().abs() * available.inner();

        Some(
            MispricingOpportunity::new(
                instrument.clone(),
                vec![instrument.clone()],
                vec![1.0],
                MispricingKind::Statistical,
                observed,
                theoretical,
                deviation,
                z_score,
                confidence,
                params.opportunity_ttl(),
            )
            .with_expected_profit(expected_profit)
            .with_risk(max_loss, Decimal::ZERO, Decimal::ZERO),
        )
    }
}

impl MispricingDetector for StatisticalDetector {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        let capacity = self.core.params.history_capacity();
        for (instrument, quote) in &snapshot.quotes {
            let mid = quote.mid().to_f64();
            if mid <= 0.0 {
                continue;
            }
            let mids = self.mids.entry(instrument.clone()).or_default();
            mids.push(mid, capacity);
            if let Some(mean) = mids.mean() {
                if mean > 0.0 {
                    self.deviations
                        .entry(instrument.clone())
                        .or_default()
                        .push((mid - mean) / mean, capacity);
                }
            }
        }
        self.snapshot = Some(snapshot.clone());
        self.core.sweep_expired(snapshot.snapshot_time);
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let Some(snapshot) = self.snapshot.clone() else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for instrument in snapshot.instruments() {
            if let Some(opportunity) = self.check_instrument(instrument) {
                found.push(self.core.emit(opportunity));
            }
        }
        found
    }

    fn set_parameters(&mut self, params: DetectionParameters) {
        self.core.set_parameters(params);
    }

    fn set_detection_callback(&mut self, callback: DetectionCallback) {
        self.core.set_detection_callback(callback);
    }

    fn set_expiry_callback(&mut self, callback: DetectionCallback) {
        self.core.set_expiry_callback(callback);
    }

    fn active_opportunities(&self) -> Vec<MispricingOpportunity> {
        self.core.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use synth_core::{Quote, Size};

    fn snapshot_at(mid: Decimal) -> Arc<MarketSnapshot> {
        let mut snapshot = MarketSnapshot::default();
        let now = Utc::now();
        let id = InstrumentId::from("BTC/USD");
        snapshot.quotes.insert(
            id.clone(),
            Quote::new(
                id,
                Price::new(mid - dec!(5)),
                Price::new(mid + dec!(5)),
                Size::new(dec!(10)),
                Size::new(dec!(10)),
                now,
                1,
            ),
        );
        snapshot.snapshot_time = now;
        Arc::new(snapshot)
    }

    fn small_params() -> DetectionParameters {
        DetectionParameters {
            min_observation_window: 10,
            ..DetectionParameters::default()
        }
    }

    #[test]
    fn test_no_emission_without_history() {
        let mut detector = StatisticalDetector::new(small_params());
        detector.update_market_data(&snapshot_at(dec!(30000)));
        assert!(detector.detect_opportunities().is_empty());
    }

    #[test]
    fn test_emits_on_large_excursion() {
        let mut detector = StatisticalDetector::new(small_params());
        // Small noise around 30000 to build a tight deviation history.
        for i in 0..20 {
            let jitter = if i % 2 == 0 { dec!(3) } else { dec!(-3) };
            detector.update_market_data(&snapshot_at(dec!(30000) + jitter));
        }
        // A 1% spike is far outside the historical deviation spread.
        detector.update_market_data(&snapshot_at(dec!(30300)));
        let found = detector.detect_opportunities();
        assert_eq!(found.len(), 1);
        let m = &found[0];
        assert_eq!(m.kind, MispricingKind::Statistical);
        assert!(m.deviation_pct > 0.005);
        assert!(m.z_score.abs() > 2.0);
        assert_eq!(detector.active_opportunities().len(), 1);
    }

    #[test]
    fn test_stable_market_stays_quiet() {
        let mut detector = StatisticalDetector::new(small_params());
        for _ in 0..30 {
            detector.update_market_data(&snapshot_at(dec!(30000)));
        }
        assert!(detector.detect_opportunities().is_empty());
    }
}
