//! Bounded per-instrument price history with rolling statistics.
//!
//! Single-owner: each model keeps its own history, so no locking is
//! needed. Pushes are O(1) amortized; statistics walk the bounded window.

use std::collections::{HashMap, VecDeque};

use synth_core::{InstrumentId, MarketSnapshot};

/// Rolling mid-price series per instrument, bounded to a window.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    window: usize,
    series: HashMap<InstrumentId, VecDeque<f64>>,
}

impl PriceHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            series: HashMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn push(&mut self, instrument: &InstrumentId, mid: f64) {
        if !mid.is_finite() || mid <= 0.0 {
            return;
        }
        let series = self
            .series
            .entry(instrument.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.window + 1));
        series.push_back(mid);
        while series.len() > self.window {
            series.pop_front();
        }
    }

    /// Record every quoted mid from a snapshot.
    pub fn observe(&mut self, snapshot: &MarketSnapshot) {
        let instruments: Vec<InstrumentId> = snapshot.instruments().cloned().collect();
        for instrument in instruments {
            if let Some(mid) = snapshot.mid(&instrument) {
                self.push(&instrument, mid.to_f64());
            }
        }
    }

    pub fn len(&self, instrument: &InstrumentId) -> usize {
        self.series.get(instrument).map(VecDeque::len).unwrap_or(0)
    }

    pub fn is_empty(&self, instrument: &InstrumentId) -> bool {
        self.len(instrument) == 0
    }

    /// Whether a full window of observations exists.
    pub fn is_warm(&self, instrument: &InstrumentId) -> bool {
        self.len(instrument) >= self.window
    }

    pub fn last(&self, instrument: &InstrumentId) -> Option<f64> {
        self.series.get(instrument)?.back().copied()
    }

    pub fn mean(&self, instrument: &InstrumentId) -> Option<f64> {
        let series = self.series.get(instrument)?;
        if series.is_empty() {
            return None;
        }
        Some(series.iter().sum::<f64>() / series.len() as f64)
    }

    /// Unbiased sample standard deviation.
    pub fn std_dev(&self, instrument: &InstrumentId) -> Option<f64> {
        let series = self.series.get(instrument)?;
        if series.len() < 2 {
            return None;
        }
        let mean = series.iter().sum::<f64>() / series.len() as f64;
        let var = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
            / (series.len() - 1) as f64;
        Some(var.sqrt())
    }

    /// Z-score of `value` against the stored series.
    pub fn z_score(&self, instrument: &InstrumentId, value: f64) -> Option<f64> {
        let mean = self.mean(instrument)?;
        let std = self.std_dev(instrument)?;
        if std <= f64::EPSILON {
            return None;
        }
        Some((value - mean) / std)
    }

    /// Bollinger bands: (mean, upper, lower) at `k` standard deviations.
    pub fn bollinger(&self, instrument: &InstrumentId, k: f64) -> Option<(f64, f64, f64)> {
        let mean = self.mean(instrument)?;
        let std = self.std_dev(instrument)?;
        Some((mean, mean + k * std, mean - k * std))
    }

    pub fn log_returns(&self, instrument: &InstrumentId) -> Vec<f64> {
        let Some(series) = self.series.get(instrument) else {
            return Vec::new();
        };
        series
            .iter()
            .zip(series.iter().skip(1))
            .filter(|(a, b)| **a > 0.0 && **b > 0.0)
            .map(|(a, b)| (b / a).ln())
            .collect()
    }

    /// Annualized realized volatility of log-returns (√252 convention).
    pub fn realized_vol(&self, instrument: &InstrumentId) -> Option<f64> {
        let returns = self.log_returns(instrument);
        if returns.len() < 2 {
            return None;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        Some(var.sqrt() * 252f64.sqrt())
    }

    /// Pearson correlation over the overlapping tail of two series,
    /// clamped to [-1, 1].
    pub fn correlation(&self, a: &InstrumentId, b: &InstrumentId) -> Option<f64> {
        let sa = self.series.get(a)?;
        let sb = self.series.get(b)?;
        let n = sa.len().min(sb.len());
        if n < 2 {
            return None;
        }
        let xa: Vec<f64> = sa.iter().skip(sa.len() - n).copied().collect();
        let xb: Vec<f64> = sb.iter().skip(sb.len() - n).copied().collect();
        let ma = xa.iter().sum::<f64>() / n as f64;
        let mb = xb.iter().sum::<f64>() / n as f64;
        let mut cov = 0.0;
        let mut va = 0.0;
        let mut vb = 0.0;
        for i in 0..n {
            let da = xa[i] - ma;
            let db = xb[i] - mb;
            cov += da * db;
            va += da * da;
            vb += db * db;
        }
        if va <= f64::EPSILON || vb <= f64::EPSILON {
            return None;
        }
        Some((cov / (va.sqrt() * vb.sqrt())).clamp(-1.0, 1.0))
    }

    /// Fraction of the window filled, in [0, 1].
    pub fn sample_ratio(&self, instrument: &InstrumentId) -> f64 {
        self.len(instrument) as f64 / self.window as f64
    }
}
