//! Implied volatility surface.
//!
//! A grid of (strike, time-to-expiry) -> implied vol points supporting
//! bilinear interpolation. Corners missing from the grid fall back to the
//! at-the-money vol for that expiry, so a sparse surface still prices.

use crate::error::{CoreError, Result};
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, BTreeSet};

type Key = (OrderedFloat<f64>, OrderedFloat<f64>);

/// Implied volatility grid keyed by (strike, time_to_expiry_years).
#[derive(Debug, Clone, Default)]
pub struct VolatilitySurface {
    points: BTreeMap<Key, f64>,
    strikes: BTreeSet<OrderedFloat<f64>>,
    expiries: BTreeSet<OrderedFloat<f64>>,
}

impl VolatilitySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a surface point.
    ///
    /// Vols must be strictly positive and finite; strikes and expiries
    /// strictly positive.
    pub fn insert(&mut self, strike: f64, tte: f64, vol: f64) -> Result<()> {
        if !(vol.is_finite() && vol > 0.0) {
            return Err(CoreError::InvalidSurfacePoint(format!(
                "non-positive vol {vol} at ({strike}, {tte})"
            )));
        }
        if !(strike.is_finite() && strike > 0.0) || !(tte.is_finite() && tte > 0.0) {
            return Err(CoreError::InvalidSurfacePoint(format!(
                "invalid coordinates ({strike}, {tte})"
            )));
        }
        self.points
            .insert((OrderedFloat(strike), OrderedFloat(tte)), vol);
        self.strikes.insert(OrderedFloat(strike));
        self.expiries.insert(OrderedFloat(tte));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Exact stored vol, if present.
    pub fn vol_at(&self, strike: f64, tte: f64) -> Option<f64> {
        self.points
            .get(&(OrderedFloat(strike), OrderedFloat(tte)))
            .copied()
    }

    /// Bilinear interpolation with ATM fallback for missing corners.
    ///
    /// Idempotent at stored points: requesting an exact grid point returns
    /// the stored vol. Queries outside the grid clamp to the boundary.
    pub fn interpolate(&self, strike: f64, tte: f64) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        if let Some(v) = self.vol_at(strike, tte) {
            return Some(v);
        }

        let (k0, k1) = bracket(&self.strikes, strike)?;
        let (t0, t1) = bracket(&self.expiries, tte)?;

        // Corner lookup with ATM fallback within the expiry row.
        let corner = |k: f64, t: f64| {
            self.vol_at(k, t)
                .or_else(|| self.atm_for_expiry(t))
                .or_else(|| self.nearest_expiry_atm(t))
        };

        let v00 = corner(k0, t0)?;
        let v10 = corner(k1, t0)?;
        let v01 = corner(k0, t1)?;
        let v11 = corner(k1, t1)?;

        let wk = weight(strike, k0, k1);
        let wt = weight(tte, t0, t1);

        let low = v00 + (v10 - v00) * wk;
        let high = v01 + (v11 - v01) * wk;
        Some(low + (high - low) * wt)
    }

    /// At-the-money vol for an expiry, given the current spot.
    ///
    /// Interpolates along the strike axis at the expiry nearest `tte`.
    pub fn atm_vol(&self, spot: f64, tte: f64) -> Option<f64> {
        self.interpolate(spot, tte)
    }

    /// Median-strike vol within one expiry row (ATM proxy when the spot is
    /// not known at lookup time).
    fn atm_for_expiry(&self, tte: f64) -> Option<f64> {
        let row: Vec<f64> = self
            .points
            .iter()
            .filter(|((_, t), _)| t.0 == tte)
            .map(|(_, v)| *v)
            .collect();
        if row.is_empty() {
            return None;
        }
        Some(row[row.len() / 2])
    }

    fn nearest_expiry_atm(&self, tte: f64) -> Option<f64> {
        let nearest = self
            .expiries
            .iter()
            .min_by(|a, b| {
                (a.0 - tte)
                    .abs()
                    .partial_cmp(&(b.0 - tte).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?
            .0;
        self.atm_for_expiry(nearest)
    }
}

/// Bracketing axis values for `x`, clamped to the boundary.
fn bracket(axis: &BTreeSet<OrderedFloat<f64>>, x: f64) -> Option<(f64, f64)> {
    let first = axis.iter().next()?.0;
    let last = axis.iter().next_back()?.0;
    if x <= first {
        return Some((first, first));
    }
    if x >= last {
        return Some((last, last));
    }
    let lower = axis
        .range(..=OrderedFloat(x))
        .next_back()
        .map(|v| v.0)
        .unwrap_or(first);
    let upper = axis
        .range(OrderedFloat(x)..)
        .next()
        .map(|v| v.0)
        .unwrap_or(last);
    Some((lower, upper))
}

fn weight(x: f64, lo: f64, hi: f64) -> f64 {
    if (hi - lo).abs() < f64::EPSILON {
        0.0
    } else {
        (x - lo) / (hi - lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_surface() -> VolatilitySurface {
        let mut s = VolatilitySurface::new();
        s.insert(28000.0, 0.25, 0.60).unwrap();
        s.insert(32000.0, 0.25, 0.55).unwrap();
        s.insert(28000.0, 0.50, 0.65).unwrap();
        s.insert(32000.0, 0.50, 0.58).unwrap();
        s
    }

    #[test]
    fn test_rejects_bad_points() {
        let mut s = VolatilitySurface::new();
        assert!(s.insert(30000.0, 0.25, 0.0).is_err());
        assert!(s.insert(30000.0, 0.25, f64::NAN).is_err());
        assert!(s.insert(-1.0, 0.25, 0.5).is_err());
        assert!(s.insert(30000.0, 0.0, 0.5).is_err());
    }

    #[test]
    fn test_idempotent_at_stored_points() {
        let s = dense_surface();
        assert_eq!(s.interpolate(28000.0, 0.25), Some(0.60));
        assert_eq!(s.interpolate(32000.0, 0.50), Some(0.58));
    }

    #[test]
    fn test_bilinear_midpoint() {
        let s = dense_surface();
        let v = s.interpolate(30000.0, 0.375).unwrap();
        // Average of all four corners at the exact center.
        assert!((v - (0.60 + 0.55 + 0.65 + 0.58) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamps_outside_grid() {
        let s = dense_surface();
        assert_eq!(s.interpolate(20000.0, 0.25), Some(0.60));
        assert_eq!(s.interpolate(40000.0, 0.60), Some(0.58));
    }

    #[test]
    fn test_missing_corner_falls_back() {
        let mut s = VolatilitySurface::new();
        s.insert(28000.0, 0.25, 0.60).unwrap();
        s.insert(32000.0, 0.25, 0.55).unwrap();
        // Sparse second expiry: only one strike quoted.
        s.insert(28000.0, 0.50, 0.65).unwrap();
        let v = s.interpolate(31000.0, 0.40);
        assert!(v.is_some());
        let v = v.unwrap();
        assert!(v > 0.5 && v < 0.7);
    }

    #[test]
    fn test_empty_surface() {
        let s = VolatilitySurface::new();
        assert_eq!(s.interpolate(30000.0, 0.25), None);
    }
}
