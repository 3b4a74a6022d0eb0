//! Triangular arbitrage detector.
//!
//! Owns a registry of named currency triangles `[A/B, B/C, A/C]`. The
//! forward cycle buys A through B and sells it against C; the reverse
//! cycle runs the loop the other way. Either cycle with a per-unit profit
//! above the deviation threshold is emitted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use synth_core::{InstrumentId, MarketSnapshot, MispricingKind, MispricingOpportunity, Price, Quote};
use synth_pricing::confidence_score;

use crate::detector::{DetectionCallback, DetectorCore, MispricingDetector};
use crate::params::DetectionParameters;

/// One registered currency triangle.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub name: String,
    /// A/B leg.
    pub pair_ab: InstrumentId,
    /// B/C leg.
    pub pair_bc: InstrumentId,
    /// A/C leg.
    pub pair_ac: InstrumentId,
}

impl Triangle {
    pub fn new(
        name: impl Into<String>,
        pair_ab: InstrumentId,
        pair_bc: InstrumentId,
        pair_ac: InstrumentId,
    ) -> Self {
        Self {
            name: name.into(),
            pair_ab,
            pair_bc,
            pair_ac,
        }
    }
}

/// Detects profitable cycles across registered triangles.
pub struct TriangularDetector {
    core: DetectorCore,
    snapshot: Option<Arc<MarketSnapshot>>,
    triangles: Vec<Triangle>,
    /// Rolling per-triangle cycle profits for z-scoring.
    profit_history: HashMap<String, VecDeque<f64>>,
}

impl TriangularDetector {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            core: DetectorCore::new(params),
            snapshot: None,
            triangles: Vec::new(),
            profit_history: HashMap::new(),
        }
    }

    pub fn register_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Best cycle profit per unit: forward converts A->B->C against the
    /// A/C ask, reverse runs C->B->A against the A/C bid. Positive means
    /// free profit before costs.
    fn cycle_profit(ab: &Quote, bc: &Quote, ac: &Quote) -> Option<f64> {
        let ab_bid = ab.bid_price.to_f64();
        let ab_ask = ab.ask_price.to_f64();
        let bc_bid = bc.bid_price.to_f64();
        let bc_ask = bc.ask_price.to_f64();
        let ac_bid = ac.bid_price.to_f64();
        let ac_ask = ac.ask_price.to_f64();
        if [ab_bid, ab_ask, bc_bid, bc_ask, ac_bid, ac_ask]
            .iter()
            .any(|p| *p <= 0.0)
        {
            return None;
        }
        let forward = ab_bid * bc_bid * (1.0 / ac_ask) - 1.0;
        let reverse = (1.0 / ab_ask) * (1.0 / bc_ask) * ac_bid - 1.0;
        Some(forward.max(reverse))
    }

    fn check_triangle(&self, triangle: &Triangle) -> Option<MispricingOpportunity> {
        let snapshot = self.snapshot.as_ref()?;
        let ab = snapshot.quote(&triangle.pair_ab)?;
        let bc = snapshot.quote(&triangle.pair_bc)?;
        let ac = snapshot.quote(&triangle.pair_ac)?;
        let params = &self.core.params;

        let profit = Self::cycle_profit(ab, bc, ac)?;
        if profit <= params.min_deviation_threshold {
            return None;
        }

        let confidence = confidence_score(
            &[ab, bc, ac],
            snapshot.snapshot_time,
            DetectorCore::FRESHNESS_BUDGET_MS,
            params.max_spread_ratio,
            1.0,
        );
        if confidence <= params.min_confidence_level {
            DetectorCore::skip("low_confidence");
            return None;
        }

        // A true cycle profit is an arbitrage regardless of its place in
        // the profit distribution; the z-score is informational.
        let z_score = self
            .profit_history
            .get(&triangle.name)
            .and_then(|h| z_of(h, profit))
            .unwrap_or(f64::MAX);

        let observed = ac.mid();
        let synthetic_mid = ab.mid().to_f64() * bc.mid().to_f64();
        let theoretical = Price::from_f64(synthetic_mid)?;

        // Executable size in A units, bounded by both A-denominated books.
        let size = ab.bid_size.min(ac.ask_size);
        let per_unit = Decimal::from_f64_retain(profit).unwrap_or(Decimal::ZERO);
        let expected_profit = per_unit * size.notional(observed);

        debug!(
            triangle = %triangle.name,
            profit,
            confidence,
            "Triangular cycle above threshold"
        );

        Some(
            MispricingOpportunity::new(
                triangle.pair_ac.clone(),
                vec![triangle.pair_ab.clone(), triangle.pair_bc.clone()],
                vec![1.0, 1.0],
                MispricingKind::Triangular,
                observed,
                theoretical,
                profit,
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

impl MispricingDetector for TriangularDetector {
    fn name(&self) -> &'static str {
        "triangular"
    }

    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        self.snapshot = Some(snapshot.clone());
        let capacity = self.core.params.history_capacity();
        for triangle in &self.triangles {
            let (Some(ab), Some(bc), Some(ac)) = (
                snapshot.quote(&triangle.pair_ab),
                snapshot.quote(&triangle.pair_bc),
                snapshot.quote(&triangle.pair_ac),
            ) else {
                continue;
            };
            if let Some(profit) = Self::cycle_profit(ab, bc, ac) {
                let history = self
                    .profit_history
                    .entry(triangle.name.clone())
                    .or_default();
                history.push_back(profit);
                while history.len() > capacity {
                    history.pop_front();
                }
            }
        }
        self.core.sweep_expired(snapshot.snapshot_time);
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let triangles = self.triangles.clone();
        let mut found = Vec::new();
        for triangle in &triangles {
            if let Some(opportunity) = self.check_triangle(triangle) {
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
    use synth_core::{Severity, Size};

    fn quote(pair: &str, bid: Decimal, ask: Decimal) -> Quote {
        Quote::new(
            InstrumentId::from(pair),
            Price::new(bid),
            Price::new(ask),
            Size::new(dec!(10)),
            Size::new(dec!(10)),
            Utc::now(),
            1,
        )
    }

    fn btc_eth_usd_snapshot() -> Arc<MarketSnapshot> {
        let mut snapshot = MarketSnapshot::default();
        snapshot.snapshot_time = Utc::now();
        for q in [
            quote("BTC/ETH", dec!(15.10), dec!(15.12)),
            quote("ETH/USD", dec!(2000), dec!(2002)),
            quote("BTC/USD", dec!(30000), dec!(30010)),
        ] {
            snapshot.quotes.insert(q.instrument.clone(), q);
        }
        Arc::new(snapshot)
    }

    fn detector(threshold: f64) -> TriangularDetector {
        let params = DetectionParameters {
            min_deviation_threshold: threshold,
            ..DetectionParameters::default()
        };
        let mut d = TriangularDetector::new(params);
        d.register_triangle(Triangle::new(
            "BTC-ETH-USD",
            InstrumentId::from("BTC/ETH"),
            InstrumentId::from("ETH/USD"),
            InstrumentId::from("BTC/USD"),
        ));
        d
    }

    #[test]
    fn test_profitable_cycle_emitted() {
        let mut d = detector(0.001);
        d.update_market_data(&btc_eth_usd_snapshot());
        let found = d.detect_opportunities();
        assert_eq!(found.len(), 1);
        let m = &found[0];
        assert_eq!(m.kind, MispricingKind::Triangular);
        // Forward cycle: 15.10 * 2000 / 30010 - 1 = +0.0063 (4 dp).
        assert!((m.deviation_pct - 0.0063).abs() < 5e-5);
        assert_eq!(m.severity, Severity::Low);
        assert!(m.expected_profit > Decimal::ZERO);
    }

    #[test]
    fn test_below_threshold_stays_quiet() {
        // Default 0.5% threshold exceeds the 0.63% cycle? No: 0.0063 > 0.005,
        // so raise the bar explicitly.
        let mut d = detector(0.01);
        d.update_market_data(&btc_eth_usd_snapshot());
        assert!(d.detect_opportunities().is_empty());
    }

    #[test]
    fn test_balanced_triangle_stays_quiet() {
        let mut d = detector(0.001);
        let mut snapshot = MarketSnapshot::default();
        snapshot.snapshot_time = Utc::now();
        // Product of mids consistent: 15 * 2000 = 30000.
        for q in [
            quote("BTC/ETH", dec!(14.999), dec!(15.001)),
            quote("ETH/USD", dec!(1999), dec!(2001)),
            quote("BTC/USD", dec!(29995), dec!(30005)),
        ] {
            snapshot.quotes.insert(q.instrument.clone(), q);
        }
        d.update_market_data(&Arc::new(snapshot));
        assert!(d.detect_opportunities().is_empty());
    }

    #[test]
    fn test_missing_leg_is_skipped() {
        let mut d = detector(0.001);
        let mut snapshot = MarketSnapshot::default();
        snapshot.snapshot_time = Utc::now();
        for q in [
            quote("BTC/ETH", dec!(15.10), dec!(15.12)),
            quote("ETH/USD", dec!(2000), dec!(2002)),
        ] {
            snapshot.quotes.insert(q.instrument.clone(), q);
        }
        d.update_market_data(&Arc::new(snapshot));
        assert!(d.detect_opportunities().is_empty());
    }
}
