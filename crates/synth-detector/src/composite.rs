//! Composite detector.
//!
//! Fans updates and detection passes out to its children, then
//! consolidates: results are sorted by expected profit descending and
//! de-duplicated by (kind, target instrument), keeping the most
//! profitable entry.

use std::collections::HashSet;
use std::sync::Arc;

use synth_core::{InstrumentId, MarketSnapshot, MispricingKind, MispricingOpportunity};

use crate::detector::{DetectionCallback, MispricingDetector};
use crate::params::DetectionParameters;

/// Owns a set of child detectors and consolidates their findings.
pub struct CompositeDetector {
    children: Vec<Box<dyn MispricingDetector>>,
}

impl CompositeDetector {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    pub fn add(&mut self, detector: Box<dyn MispricingDetector>) {
        self.children.push(detector);
    }

    pub fn with(mut self, detector: Box<dyn MispricingDetector>) -> Self {
        self.add(detector);
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Sort by expected profit descending, then keep the first (highest
    /// profit) entry per (kind, target).
    fn consolidate(mut found: Vec<MispricingOpportunity>) -> Vec<MispricingOpportunity> {
        found.sort_by(|a, b| b.expected_profit.cmp(&a.expected_profit));
        let mut seen: HashSet<(MispricingKind, InstrumentId)> = HashSet::new();
        found
            .into_iter()
            .filter(|m| seen.insert((m.kind, m.target.clone())))
            .collect()
    }
}

impl Default for CompositeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MispricingDetector for CompositeDetector {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        for child in &mut self.children {
            child.update_market_data(snapshot);
        }
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let mut found = Vec::new();
        for child in &mut self.children {
            found.extend(child.detect_opportunities());
        }
        Self::consolidate(found)
    }

    fn set_parameters(&mut self, params: DetectionParameters) {
        for child in &mut self.children {
            child.set_parameters(params.clone());
        }
    }

    fn set_detection_callback(&mut self, callback: DetectionCallback) {
        for child in &mut self.children {
            child.set_detection_callback(callback.clone());
        }
    }

    fn set_expiry_callback(&mut self, callback: DetectionCallback) {
        for child in &mut self.children {
            child.set_expiry_callback(callback.clone());
        }
    }

    fn active_opportunities(&self) -> Vec<MispricingOpportunity> {
        self.children
            .iter()
            .flat_map(|c| c.active_opportunities())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use synth_core::Price;

    fn opportunity(kind: MispricingKind, target: &str, profit: Decimal) -> MispricingOpportunity {
        MispricingOpportunity::new(
            InstrumentId::from(target),
            vec![],
            vec![],
            kind,
            Price::new(dec!(100)),
            Price::new(dec!(99)),
            0.01,
            2.5,
            0.9,
            Duration::minutes(30),
        )
        .with_expected_profit(profit)
    }

    /// A stub child that returns a fixed batch per pass.
    struct StubDetector {
        batch: Vec<MispricingOpportunity>,
    }

    impl MispricingDetector for StubDetector {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn update_market_data(&mut self, _snapshot: &Arc<MarketSnapshot>) {}

        fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
            self.batch.clone()
        }

        fn set_parameters(&mut self, _params: DetectionParameters) {}

        fn set_detection_callback(&mut self, _callback: DetectionCallback) {}

        fn set_expiry_callback(&mut self, _callback: DetectionCallback) {}

        fn active_opportunities(&self) -> Vec<MispricingOpportunity> {
            self.batch.clone()
        }
    }

    #[test]
    fn test_sorted_and_deduplicated() {
        let mut composite = CompositeDetector::new();
        composite.add(Box::new(StubDetector {
            batch: vec![
                opportunity(MispricingKind::Basis, "BTC-PERP", dec!(50)),
                opportunity(MispricingKind::Statistical, "BTC/USD", dec!(10)),
            ],
        }));
        composite.add(Box::new(StubDetector {
            batch: vec![
                // Duplicate (kind, target) with a higher profit must win.
                opportunity(MispricingKind::Basis, "BTC-PERP", dec!(80)),
                opportunity(MispricingKind::Triangular, "BTC/USD", dec!(30)),
            ],
        }));

        let found = composite.detect_opportunities();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].expected_profit, dec!(80));
        assert_eq!(found[0].kind, MispricingKind::Basis);
        assert_eq!(found[1].expected_profit, dec!(30));
        assert_eq!(found[2].expected_profit, dec!(10));
        // Same target under a different kind is not a duplicate.
        assert!(found
            .iter()
            .any(|m| m.kind == MispricingKind::Statistical && m.target.as_str() == "BTC/USD"));
    }

    #[test]
    fn test_empty_composite() {
        let mut composite = CompositeDetector::new();
        assert!(composite.detect_opportunities().is_empty());
        assert!(composite.is_empty());
    }
}
