//! Confidence scoring shared by every model.
//!
//! Confidence is `min(freshness, spread_score, sample_score)`: a synthetic
//! price is only as trustworthy as its worst input. Each factor is a
//! linear penalty curve that is flat at 1.0 inside its threshold and falls
//! off linearly past it.

use chrono::{DateTime, Utc};
use synth_core::Quote;

/// Freshness factor: 1.0 within the budget, linear fall-off to 0.0 at
/// twice the budget.
pub fn freshness_score(age_ms: i64, budget_ms: u64) -> f64 {
    let budget = budget_ms.max(1) as f64;
    let age = age_ms.max(0) as f64;
    if age <= budget {
        1.0
    } else {
        (1.0 - (age - budget) / budget).max(0.0)
    }
}

/// Spread factor: 1.0 up to the threshold ratio, linear fall-off to 0.0 at
/// twice the threshold.
pub fn spread_score(spread_ratio: f64, max_ratio: f64) -> f64 {
    if max_ratio <= 0.0 {
        return 0.0;
    }
    if spread_ratio <= max_ratio {
        1.0
    } else {
        (1.0 - (spread_ratio - max_ratio) / max_ratio).max(0.0)
    }
}

/// Sample factor: linear in the filled fraction of the window.
pub fn sample_score(have: usize, need: usize) -> f64 {
    if need == 0 {
        return 1.0;
    }
    (have as f64 / need as f64).min(1.0)
}

/// Combined confidence for a set of component quotes.
///
/// Takes the worst component on each axis, then the minimum across axes.
pub fn confidence_score(
    quotes: &[&Quote],
    now: DateTime<Utc>,
    budget_ms: u64,
    max_spread_ratio: f64,
    sample_ratio: f64,
) -> f64 {
    if quotes.is_empty() {
        return 0.0;
    }
    let freshness = quotes
        .iter()
        .map(|q| freshness_score((now - q.timestamp).num_milliseconds(), budget_ms))
        .fold(1.0, f64::min);
    let spread = quotes
        .iter()
        .map(|q| spread_score(q.spread_ratio().unwrap_or(f64::INFINITY), max_spread_ratio))
        .fold(1.0, f64::min);
    freshness.min(spread).min(sample_ratio.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use synth_core::{InstrumentId, Price, Size};

    #[test]
    fn test_freshness_curve() {
        assert_eq!(freshness_score(0, 500), 1.0);
        assert_eq!(freshness_score(500, 500), 1.0);
        assert!((freshness_score(750, 500) - 0.5).abs() < 1e-12);
        assert_eq!(freshness_score(1000, 500), 0.0);
        assert_eq!(freshness_score(5000, 500), 0.0);
    }

    #[test]
    fn test_spread_curve() {
        assert_eq!(spread_score(0.01, 0.02), 1.0);
        assert!((spread_score(0.03, 0.02) - 0.5).abs() < 1e-12);
        assert_eq!(spread_score(0.04, 0.02), 0.0);
    }

    #[test]
    fn test_sample_curve() {
        assert_eq!(sample_score(25, 50), 0.5);
        assert_eq!(sample_score(80, 50), 1.0);
        assert_eq!(sample_score(0, 0), 1.0);
    }

    #[test]
    fn test_combined_takes_minimum() {
        let now = Utc::now();
        let quote = Quote::new(
            InstrumentId::from("BTC/USD"),
            Price::new(dec!(30000)),
            Price::new(dec!(30010)),
            Size::new(dec!(1)),
            Size::new(dec!(1)),
            now,
            1,
        );
        let c = confidence_score(&[&quote], now, 500, 0.02, 0.4);
        assert!((c - 0.4).abs() < 1e-12);
    }
}
