//! Volatility dislocation detector.
//!
//! Tracks a bounded mid-price history per instrument (100 observations)
//! and compares annualized realized volatility against a spread-implied
//! proxy. A signed gap above the volatility threshold is emitted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use synth_core::{InstrumentId, MarketSnapshot, MispricingKind, MispricingOpportunity};
use synth_pricing::confidence_score;

use crate::detector::{DetectionCallback, DetectorCore, MispricingDetector};
use crate::params::DetectionParameters;

/// Mid-price observations retained per instrument.
const MID_HISTORY: usize = 100;

/// Detects gaps between realized and spread-implied volatility.
pub struct VolatilityDetector {
    core: DetectorCore,
    snapshot: Option<Arc<MarketSnapshot>>,
    mids: HashMap<InstrumentId, VecDeque<f64>>,
    /// Rolling implied-minus-realized gaps for z-scoring.
    gaps: HashMap<InstrumentId, VecDeque<f64>>,
}

impl VolatilityDetector {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            core: DetectorCore::new(params),
            snapshot: None,
            mids: HashMap::new(),
            gaps: HashMap::new(),
        }
    }

    /// Annualized realized vol of log-returns (sqrt(252) convention).
    fn realized_vol(mids: &VecDeque<f64>) -> Option<f64> {
        if mids.len() < 3 {
            return None;
        }
        let returns: Vec<f64> = mids
            .iter()
            .zip(mids.iter().skip(1))
            .filter(|(a, b)| **a > 0.0 && **b > 0.0)
            .map(|(a, b)| (b / a).ln())
            .collect();
        if returns.len() < 2 {
            return None;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        Some(var.sqrt() * 252f64.sqrt())
    }

    fn check_instrument(&self, instrument: &InstrumentId) -> Option<MispricingOpportunity> {
        let snapshot = self.snapshot.as_ref()?;
        let quote = snapshot.quote(instrument)?;
        let params = &self.core.params;

        let mids = self.mids.get(instrument)?;
        if mids.len() < params.min_observation_window.min(MID_HISTORY) {
            DetectorCore::skip("insufficient_history");
            return None;
        }

        let realized = Self::realized_vol(mids)?;
        let implied_proxy = quote.spread_ratio()?;
        let gap = implied_proxy - realized;
        if gap.abs() <= params.volatility_threshold {
            return None;
        }

        let z_score = self
            .gaps
            .get(instrument)
            .and_then(|h| z_of(h, gap))
            .unwrap_or(0.0);
        let confidence = confidence_score(
            &[quote],
            snapshot.snapshot_time,
            DetectorCore::FRESHNESS_BUDGET_MS,
            // The proxy is the spread itself, so a wide quote is the
            // signal rather than a quality defect; relax the spread axis.
            1.0,
            (mids.len() as f64 / MID_HISTORY as f64).min(1.0),
        );
        if confidence <= params.min_confidence_level {
            DetectorCore::skip("low_confidence");
            return None;
        }
        if z_score.abs() <= params.min_z_score {
            DetectorCore::skip("low_z_score");
            return None;
        }

        Some(MispricingOpportunity::new(
            instrument.clone(),
            vec![instrument.clone()],
            vec![1.0],
            MispricingKind::Volatility,
            quote.mid(),
            quote.mid(),
            gap,
            z_score,
            confidence,
            params.opportunity_ttl(),
        ))
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

impl MispricingDetector for VolatilityDetector {
    fn name(&self) -> &'static str {
        "volatility"
    }

    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        for (instrument, quote) in &snapshot.quotes {
            let mid = quote.mid().to_f64();
            if mid <= 0.0 {
                continue;
            }
            let mids = self.mids.entry(instrument.clone()).or_default();
            mids.push_back(mid);
            while mids.len() > MID_HISTORY {
                mids.pop_front();
            }
            if let (Some(realized), Some(proxy)) =
                (Self::realized_vol(mids), quote.spread_ratio())
            {
                let gaps = self.gaps.entry(instrument.clone()).or_default();
                gaps.push_back(proxy - realized);
                while gaps.len() > MID_HISTORY {
                    gaps.pop_front();
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
