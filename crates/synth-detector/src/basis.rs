//! Basis calculator.
//!
//! For each registered (spot, derivative) pair, compares the observed
//! basis against the theoretical basis implied by a pricing model, and
//! z-scores the observed basis against its rolling history. Excess basis
//! relative to spot above the deviation threshold is emitted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use synth_core::{InstrumentId, MarketSnapshot, MispricingKind, MispricingOpportunity};
use synth_pricing::{confidence_score, PricingModel};

use crate::detector::{DetectionCallback, DetectorCore, MispricingDetector};
use crate::params::DetectionParameters;

/// One monitored spot/derivative pair.
#[derive(Debug, Clone)]
pub struct BasisPair {
    pub spot: InstrumentId,
    pub derivative: InstrumentId,
}

impl BasisPair {
    pub fn new(spot: InstrumentId, derivative: InstrumentId) -> Self {
        Self { spot, derivative }
    }
}

/// Detects abnormal basis between derivatives and their underlyings.
pub struct BasisDetector {
    core: DetectorCore,
    snapshot: Option<Arc<MarketSnapshot>>,
    pairs: Vec<BasisPair>,
    /// Theoretical-price source (perpetual or carry model).
    model: Box<dyn PricingModel>,
    /// Rolling observed basis per derivative.
    basis_history: HashMap<InstrumentId, VecDeque<f64>>,
}

impl BasisDetector {
    pub fn new(params: DetectionParameters, model: Box<dyn PricingModel>) -> Self {
        Self {
            core: DetectorCore::new(params),
            snapshot: None,
            pairs: Vec::new(),
            model,
            basis_history: HashMap::new(),
        }
    }

    pub fn register_pair(&mut self, pair: BasisPair) {
        self.pairs.push(pair);
    }

    pub fn pairs(&self) -> &[BasisPair] {
        &self.pairs
    }

    fn check_pair(&self, pair: &BasisPair) -> Option<MispricingOpportunity> {
        let snapshot = self.snapshot.as_ref()?;
        let spot = snapshot.quote(&pair.spot)?;
        let derivative = snapshot.quote(&pair.derivative)?;
        let params = &self.core.params;

        let spot_mid = spot.mid();
        if spot_mid.is_zero() {
            return None;
        }
        let observed_basis = derivative.mid().inner() - spot_mid.inner();

        let synthetic = match self
            .model
            .synthetic_price(&pair.derivative, &[pair.spot.clone()], snapshot)
        {
            Ok(sp) => sp,
            Err(err) => {
                debug!(derivative = %pair.derivative, %err, "Theoretical basis unavailable");
                DetectorCore::skip("model_domain");
                return None;
            }
        };
        let theoretical_basis = synthetic.theoretical.inner() - spot_mid.inner();
        let excess = observed_basis - theoretical_basis;
        let deviation = (excess / spot_mid.inner()).to_f64()?;

        let history = self.basis_history.get(&pair.derivative)?;
        if history.len() < params.min_observation_window {
            DetectorCore::skip("insufficient_history");
            return None;
        }
        let z_score = z_of(history, observed_basis.to_f64()?)?;

        let confidence = confidence_score(
            &[spot, derivative],
            snapshot.snapshot_time,
            DetectorCore::FRESHNESS_BUDGET_MS,
            params.max_spread_ratio,
            (history.len() as f64 / params.history_capacity() as f64).min(1.0),
        )
        .min(synthetic.confidence);

        if !self.core.passes_gate(deviation, z_score, confidence) {
            return None;
        }

        // Capturing the excess basis earns it on every unit both books
        // can absorb at the top.
        let size = derivative
            .taker_liquidity(if excess > Decimal::ZERO {
                synth_core::Side::Sell
            } else {
                synth_core::Side::Buy
            })
            .min(spot.taker_liquidity(if excess > Decimal::ZERO {
                synth_core::Side::Buy
            } else {
                synth_core::Side::Sell
            }));
        let expected_profit = excess.abs() * size.inner();

        Some(
            MispricingOpportunity::new(
                pair.derivative.clone(),
                vec![pair.spot.clone()],
                vec![1.0],
                MispricingKind::Basis,
                derivative.mid(),
                synthetic.theoretical,
                deviation,
                z_score,
                confidence,
                params.opportunity_ttl(),
            )
            .with_expected_profit(expected_profit),
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

impl MispricingDetector for BasisDetector {
    fn name(&self) -> &'static str {
        "basis"
    }

    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        self.model.ingest(snapshot);
        let capacity = self.core.params.history_capacity();
        for pair in &self.pairs {
            let (Some(spot), Some(derivative)) = (
                snapshot.quote(&pair.spot),
                snapshot.quote(&pair.derivative),
            ) else {
                continue;
            };
            let basis = derivative.mid().inner() - spot.mid().inner();
            if let Some(basis) = basis.to_f64() {
                let history = self
                    .basis_history
                    .entry(pair.derivative.clone())
                    .or_default();
                history.push_back(basis);
                while history.len() > capacity {
                    history.pop_front();
                }
            }
        }
        self.snapshot = Some(snapshot.clone());
        self.core.sweep_expired(snapshot.snapshot_time);
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let pairs = self.pairs.clone();
        let mut found = Vec::new();
        for pair in &pairs {
            if let Some(opportunity) = self.check_pair(pair) {
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
