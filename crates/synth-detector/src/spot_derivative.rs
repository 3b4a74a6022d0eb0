//! Spot-vs-derivative detector.
//!
//! Uses an injected pricing model (perpetual, carry, or options) to
//! compute the theoretical derivative price from spot, and emits when the
//! relative gap between the market and the model clears the threshold.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::debug;

use synth_core::{InstrumentId, MarketSnapshot, MispricingKind, MispricingOpportunity};
use synth_pricing::{confidence_score, PricingModel};

use crate::detector::{DetectionCallback, DetectorCore, MispricingDetector};
use crate::params::DetectionParameters;

/// Detects derivatives trading away from their model price.
pub struct SpotDerivativeDetector {
    core: DetectorCore,
    snapshot: Option<Arc<MarketSnapshot>>,
    model: Box<dyn PricingModel>,
    /// (derivative, spot) pairs under watch.
    pairs: Vec<(InstrumentId, InstrumentId)>,
    /// Rolling relative deviations for z-scoring.
    deviation_history: HashMap<InstrumentId, VecDeque<f64>>,
}

impl SpotDerivativeDetector {
    pub fn new(params: DetectionParameters, model: Box<dyn PricingModel>) -> Self {
        Self {
            core: DetectorCore::new(params),
            snapshot: None,
            model,
            pairs: Vec::new(),
            deviation_history: HashMap::new(),
        }
    }

    pub fn watch(&mut self, derivative: InstrumentId, spot: InstrumentId) {
        self.pairs.push((derivative, spot));
    }

    fn deviation_for(
        &self,
        derivative: &InstrumentId,
        spot: &InstrumentId,
        snapshot: &MarketSnapshot,
    ) -> Option<(f64, f64)> {
        let market = snapshot.mid(derivative)?.to_f64();
        let synthetic = self
            .model
            .synthetic_price(derivative, std::slice::from_ref(spot), snapshot)
            .ok()?;
        let theoretical = synthetic.theoretical.to_f64();
        if theoretical <= 0.0 {
            return None;
        }
        Some(((market - theoretical) / theoretical, synthetic.confidence))
    }

    fn check_pair(
        &self,
        derivative: &InstrumentId,
        spot: &InstrumentId,
    ) -> Option<MispricingOpportunity> {
        let snapshot = self.snapshot.as_ref()?;
        let derivative_quote = snapshot.quote(derivative)?;
        let spot_quote = snapshot.quote(spot)?;
        let params = &self.core.params;

        let synthetic = match self
            .model
            .synthetic_price(derivative, std::slice::from_ref(spot), snapshot)
        {
            Ok(sp) => sp,
            Err(err) => {
                debug!(%derivative, %err, "Model price unavailable");
                DetectorCore::skip("model_domain");
                return None;
            }
        };
        let theoretical = synthetic.theoretical.to_f64();
        if theoretical <= 0.0 {
            return None;
        }
        let deviation = (derivative_quote.mid().to_f64() - theoretical) / theoretical;

        let history = self.deviation_history.get(derivative)?;
        if history.len() < params.min_observation_window {
            DetectorCore::skip("insufficient_history");
            return None;
        }
        let z_score = z_of(history, deviation)?;

        let confidence = confidence_score(
            &[derivative_quote, spot_quote],
            snapshot.snapshot_time,
            DetectorCore::FRESHNESS_BUDGET_MS,
            params.max_spread_ratio,
            (history.len() as f64 / params.history_capacity() as f64).min(1.0),
        )
        .min(synthetic.confidence);

        if !self.core.passes_gate(deviation, z_score, confidence) {
            return None;
        }

        let per_unit = (derivative_quote.mid().inner() - synthetic.theoretical.inner()).abs();
        let size = derivative_quote.bid_size.min(derivative_quote.ask_size);

        Some(
            MispricingOpportunity::new(
                derivative.clone(),
                vec![spot.clone()],
                vec![1.0],
                MispricingKind::SpotDerivative,
                derivative_quote.mid(),
                synthetic.theoretical,
                deviation,
                z_score,
                confidence,
                params.opportunity_ttl(),
            )
            .with_expected_profit(per_unit * size.inner()),
        )
    }
}

fn z_of(history: &VecDeque<f64>, value: f64) -> Option<f64> {
    if history.len() < 2 {
        return None;
    }
    let mean = history.iter().sum::<f64>() / history.len() as f64;
    let var = history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (history.len() - 1) as f64;
    let std = var.sqrt();
    if std <= f64::EPSILON {
        return None;
    }
    Some((value - mean) / std)
}

impl MispricingDetector for SpotDerivativeDetector {
    fn name(&self) -> &'static str {
        "spot_derivative"
    }

    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        self.model.ingest(snapshot);
        self.snapshot = Some(snapshot.clone());
        let capacity = self.core.params.history_capacity();
        let pairs = self.pairs.clone();
        for (derivative, spot) in &pairs {
            if let Some((deviation, _)) = self.deviation_for(derivative, spot, snapshot) {
                let history = self.deviation_history.entry(derivative.clone()).or_default();
                history.push_back(deviation);
                while history.len() > capacity {
                    history.pop_front();
                }
            }
        }
        self.core.sweep_expired(snapshot.snapshot_time);
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let pairs = self.pairs.clone();
        let mut found = Vec::new();
        for (derivative, spot) in &pairs {
            if let Some(opportunity) = self.check_pair(derivative, spot) {
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
