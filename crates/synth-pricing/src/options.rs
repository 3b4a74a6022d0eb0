//! Option pricing on a volatility surface.
//!
//! Black–Scholes with analytic greeks; implied volatility by bisection.
//! The model looks vols up on a per-underlying `VolatilitySurface`, with
//! the surface's own ATM fallback covering sparse grids.

use std::collections::HashMap;

use synth_core::{Instrument, InstrumentId, MarketSnapshot, Price, SyntheticPrice, VolatilitySurface};

use crate::confidence::confidence_score;
use crate::error::{ModelError, ModelResult};
use crate::history::PriceHistory;
use crate::model::{ModelParameters, PricingModel};

/// Analytic option sensitivities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

/// Black–Scholes closed forms.
pub mod black_scholes {
    use statrs::function::erf::erf;

    use crate::error::{ModelError, ModelResult};

    use super::Greeks;

    fn norm_cdf(x: f64) -> f64 {
        0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
    }

    fn norm_pdf(x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
    }

    fn validate(spot: f64, strike: f64, vol: f64, tau: f64) -> ModelResult<()> {
        if spot <= 0.0 || strike <= 0.0 {
            return Err(ModelError::Domain(format!(
                "non-positive spot/strike: {spot}/{strike}"
            )));
        }
        if vol <= 0.0 || !vol.is_finite() {
            return Err(ModelError::Domain(format!("non-positive vol: {vol}")));
        }
        if tau <= 0.0 {
            return Err(ModelError::Domain(format!(
                "non-positive time to expiry: {tau}"
            )));
        }
        Ok(())
    }

    fn d1_d2(spot: f64, strike: f64, vol: f64, tau: f64, rate: f64) -> (f64, f64) {
        let sqrt_tau = tau.sqrt();
        let d1 = ((spot / strike).ln() + (rate + 0.5 * vol * vol) * tau) / (vol * sqrt_tau);
        (d1, d1 - vol * sqrt_tau)
    }

    /// Option premium.
    pub fn price(
        spot: f64,
        strike: f64,
        vol: f64,
        tau: f64,
        rate: f64,
        is_call: bool,
    ) -> ModelResult<f64> {
        validate(spot, strike, vol, tau)?;
        let (d1, d2) = d1_d2(spot, strike, vol, tau, rate);
        let discount = (-rate * tau).exp();
        let value = if is_call {
            spot * norm_cdf(d1) - strike * discount * norm_cdf(d2)
        } else {
            strike * discount * norm_cdf(-d2) - spot * norm_cdf(-d1)
        };
        Ok(value)
    }

    /// Analytic greeks; theta is per year.
    pub fn greeks(
        spot: f64,
        strike: f64,
        vol: f64,
        tau: f64,
        rate: f64,
        is_call: bool,
    ) -> ModelResult<Greeks> {
        validate(spot, strike, vol, tau)?;
        let (d1, d2) = d1_d2(spot, strike, vol, tau, rate);
        let sqrt_tau = tau.sqrt();
        let discount = (-rate * tau).exp();
        let pdf_d1 = norm_pdf(d1);

        let delta = if is_call {
            norm_cdf(d1)
        } else {
            norm_cdf(d1) - 1.0
        };
        let gamma = pdf_d1 / (spot * vol * sqrt_tau);
        let vega = spot * pdf_d1 * sqrt_tau;
        let common_theta = -spot * pdf_d1 * vol / (2.0 * sqrt_tau);
        let theta = if is_call {
            common_theta - rate * strike * discount * norm_cdf(d2)
        } else {
            common_theta + rate * strike * discount * norm_cdf(-d2)
        };
        let rho = if is_call {
            strike * tau * discount * norm_cdf(d2)
        } else {
            -strike * tau * discount * norm_cdf(-d2)
        };

        Ok(Greeks {
            delta,
            gamma,
            theta,
            vega,
            rho,
        })
    }

    /// Implied volatility by bisection: tolerance 1e-6, at most 50
    /// iterations (the bracket converges well before the cap).
    pub fn implied_vol(
        market_price: f64,
        spot: f64,
        strike: f64,
        tau: f64,
        rate: f64,
        is_call: bool,
    ) -> ModelResult<f64> {
        const TOL: f64 = 1e-6;
        const MAX_ITER: usize = 50;
        let mut lo = 1e-4;
        let mut hi = 5.0;

        if market_price <= 0.0 {
            return Err(ModelError::Domain(format!(
                "non-positive option price: {market_price}"
            )));
        }
        let p_lo = price(spot, strike, lo, tau, rate, is_call)?;
        let p_hi = price(spot, strike, hi, tau, rate, is_call)?;
        if market_price < p_lo || market_price > p_hi {
            return Err(ModelError::Domain(format!(
                "price {market_price} outside attainable range [{p_lo}, {p_hi}]"
            )));
        }

        let mut mid = 0.5 * (lo + hi);
        for _ in 0..MAX_ITER {
            mid = 0.5 * (lo + hi);
            let p_mid = price(spot, strike, mid, tau, rate, is_call)?;
            if (p_mid - market_price).abs() < TOL || (hi - lo) < TOL {
                return Ok(mid);
            }
            if p_mid < market_price {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(mid)
    }
}

/// Option registration: definition, underlying, and direction.
#[derive(Debug, Clone)]
struct OptionSpec {
    definition: Instrument,
    underlying: InstrumentId,
    is_call: bool,
}

/// Prices listed options off spot and a per-underlying vol surface.
pub struct OptionPricingModel {
    params: ModelParameters,
    options: HashMap<InstrumentId, OptionSpec>,
    surfaces: HashMap<InstrumentId, VolatilitySurface>,
    history: PriceHistory,
}

impl OptionPricingModel {
    pub fn new(params: ModelParameters) -> Self {
        let window = params.lookback_period;
        Self {
            params,
            options: HashMap::new(),
            surfaces: HashMap::new(),
            history: PriceHistory::new(window),
        }
    }

    /// Register an option and the spot instrument it prices off.
    pub fn register_option(
        &mut self,
        definition: Instrument,
        underlying: InstrumentId,
        is_call: bool,
    ) -> ModelResult<()> {
        if definition.strike.is_none() || definition.expiry.is_none() {
            return Err(ModelError::Domain(format!(
                "{} lacks strike or expiry",
                definition.id
            )));
        }
        self.options.insert(
            definition.id.clone(),
            OptionSpec {
                definition,
                underlying,
                is_call,
            },
        );
        Ok(())
    }

    /// Install or replace the vol surface for an underlying.
    pub fn set_surface(&mut self, underlying: InstrumentId, surface: VolatilitySurface) {
        self.surfaces.insert(underlying, surface);
    }

    fn spec(&self, option: &InstrumentId) -> ModelResult<&OptionSpec> {
        self.options
            .get(option)
            .ok_or_else(|| ModelError::UnknownInstrument(option.clone()))
    }

    fn inputs(
        &self,
        spec: &OptionSpec,
        snapshot: &MarketSnapshot,
    ) -> ModelResult<(f64, f64, f64, f64)> {
        let strike = spec
            .definition
            .strike
            .ok_or_else(|| ModelError::Domain("option without strike".into()))?
            .to_f64();
        let tau = spec
            .definition
            .time_to_expiry_years(snapshot.snapshot_time)
            .ok_or_else(|| ModelError::Domain("option without expiry".into()))?;
        if tau <= 0.0 {
            return Err(ModelError::Domain(format!("expired option: tau={tau}")));
        }
        let spot = snapshot
            .mid(&spec.underlying)
            .ok_or_else(|| ModelError::UnknownInstrument(spec.underlying.clone()))?
            .to_f64();
        let surface = self
            .surfaces
            .get(&spec.underlying)
            .ok_or_else(|| ModelError::Domain(format!("no surface for {}", spec.underlying)))?;
        let vol = surface
            .interpolate(strike, tau)
            .ok_or_else(|| ModelError::Domain("empty volatility surface".into()))?;
        Ok((spot, strike, vol, tau))
    }

    /// Analytic greeks for a registered option under a snapshot.
    pub fn greeks(&self, option: &InstrumentId, snapshot: &MarketSnapshot) -> ModelResult<Greeks> {
        let spec = self.spec(option)?;
        let (spot, strike, vol, tau) = self.inputs(spec, snapshot)?;
        black_scholes::greeks(spot, strike, vol, tau, self.params.risk_free_rate, spec.is_call)
    }

    /// Implied vol from the option's own market quote.
    pub fn implied_vol(
        &self,
        option: &InstrumentId,
        snapshot: &MarketSnapshot,
    ) -> ModelResult<f64> {
        let spec = self.spec(option)?;
        let (spot, strike, _, tau) = self.inputs(spec, snapshot)?;
        let market = snapshot
            .mid(option)
            .ok_or_else(|| ModelError::UnknownInstrument(option.clone()))?
            .to_f64();
        black_scholes::implied_vol(
            market,
            spot,
            strike,
            tau,
            self.params.risk_free_rate,
            spec.is_call,
        )
    }
}

impl PricingModel for OptionPricingModel {
    fn name(&self) -> &'static str {
        "options"
    }

    fn ingest(&mut self, snapshot: &MarketSnapshot) {
        self.history.observe(snapshot);
    }

    fn synthetic_price(
        &self,
        target: &InstrumentId,
        _components: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> ModelResult<SyntheticPrice> {
        let spec = self.spec(target)?;
        let (_, strike, vol, tau) = self.inputs(spec, snapshot)?;
        let underlying_quote = snapshot
            .quote(&spec.underlying)
            .ok_or_else(|| ModelError::UnknownInstrument(spec.underlying.clone()))?;
        let rate = self.params.risk_free_rate;

        let theoretical = black_scholes::price(
            underlying_quote.mid().to_f64(),
            strike,
            vol,
            tau,
            rate,
            spec.is_call,
        )?;
        let at_bid = black_scholes::price(
            underlying_quote.bid_price.to_f64(),
            strike,
            vol,
            tau,
            rate,
            spec.is_call,
        )?;
        let at_ask = black_scholes::price(
            underlying_quote.ask_price.to_f64(),
            strike,
            vol,
            tau,
            rate,
            spec.is_call,
        )?;
        // Puts decrease in spot, so order the pair rather than assume.
        let (bid, ask) = if at_bid <= at_ask {
            (at_bid, at_ask)
        } else {
            (at_ask, at_bid)
        };

        let confidence = confidence_score(
            &[underlying_quote],
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            self.history.sample_ratio(&spec.underlying),
        );

        let to_price = |v: f64| {
            Price::from_f64(v).ok_or_else(|| ModelError::Domain(format!("bad option price {v}")))
        };
        Ok(SyntheticPrice::new(
            to_price(theoretical)?,
            to_price(bid)?,
            to_price(ask)?,
            confidence,
            vec![spec.underlying.clone()],
            vec![1.0],
        )?)
    }

    fn correlation(&self, a: &InstrumentId, b: &InstrumentId) -> Option<f64> {
        self.history.correlation(a, b)
    }

    fn update_parameters(&mut self, params: ModelParameters) {
        if params.lookback_period != self.params.lookback_period {
            self.history = PriceHistory::new(params.lookback_period);
        }
        self.params = params;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use synth_core::{Quote, Size};

    #[test]
    fn test_put_call_parity() {
        let (s, k, vol, tau, r) = (30000.0, 31000.0, 0.6, 0.5, 0.05);
        let call = black_scholes::price(s, k, vol, tau, r, true).unwrap();
        let put = black_scholes::price(s, k, vol, tau, r, false).unwrap();
        let parity = call - put - (s - k * (-r * tau).exp());
        assert!(parity.abs() < 1e-9);
    }

    #[test]
    fn test_domain_errors() {
        assert!(black_scholes::price(30000.0, 31000.0, 0.6, -0.1, 0.05, true).is_err());
        assert!(black_scholes::price(30000.0, 31000.0, 0.0, 0.5, 0.05, true).is_err());
        assert!(black_scholes::price(0.0, 31000.0, 0.6, 0.5, 0.05, true).is_err());
    }

    #[test]
    fn test_greeks_signs() {
        let g_call = black_scholes::greeks(30000.0, 30000.0, 0.6, 0.5, 0.05, true).unwrap();
        assert!(g_call.delta > 0.0 && g_call.delta < 1.0);
        assert!(g_call.gamma > 0.0);
        assert!(g_call.vega > 0.0);
        assert!(g_call.theta < 0.0);
        assert!(g_call.rho > 0.0);

        let g_put = black_scholes::greeks(30000.0, 30000.0, 0.6, 0.5, 0.05, false).unwrap();
        assert!(g_put.delta < 0.0 && g_put.delta > -1.0);
        assert!(g_put.rho < 0.0);
    }

    #[test]
    fn test_implied_vol_round_trip() {
        let (s, k, tau, r) = (30000.0, 32000.0, 0.25, 0.05);
        let vol = 0.72;
        let premium = black_scholes::price(s, k, vol, tau, r, true).unwrap();
        let recovered = black_scholes::implied_vol(premium, s, k, tau, r, true).unwrap();
        assert!((recovered - vol).abs() < 1e-4);
    }

    #[test]
    fn test_implied_vol_out_of_range() {
        // An option priced above spot is unattainable for any vol.
        assert!(black_scholes::implied_vol(40000.0, 30000.0, 32000.0, 0.25, 0.05, true).is_err());
    }

    fn model_with_option() -> (OptionPricingModel, InstrumentId, MarketSnapshot) {
        let mut model = OptionPricingModel::new(ModelParameters::default());
        let option = InstrumentId::from("BTC-31000-C");
        let underlying = InstrumentId::from("BTC/USD");
        model
            .register_option(
                Instrument::option(
                    option.clone(),
                    Price::new(dec!(0.1)),
                    Size::new(dec!(0.01)),
                    Utc::now() + Duration::days(90),
                    Price::new(dec!(31000)),
                ),
                underlying.clone(),
                true,
            )
            .unwrap();
        let mut surface = VolatilitySurface::new();
        surface.insert(29000.0, 0.25, 0.62).unwrap();
        surface.insert(33000.0, 0.25, 0.58).unwrap();
        model.set_surface(underlying.clone(), surface);

        let mut snapshot = MarketSnapshot::default();
        let now = Utc::now();
        snapshot.quotes.insert(
            underlying.clone(),
            Quote::new(
                underlying,
                Price::new(dec!(29995)),
                Price::new(dec!(30005)),
                Size::new(dec!(3)),
                Size::new(dec!(3)),
                now,
                1,
            ),
        );
        snapshot.snapshot_time = now;
        (model, option, snapshot)
    }

    #[test]
    fn test_model_prices_registered_option() {
        let (model, option, snapshot) = model_with_option();
        let sp = model.synthetic_price(&option, &[], &snapshot).unwrap();
        assert!(sp.theoretical.is_positive());
        assert!(sp.bid <= sp.ask);
        assert!(sp.confidence > 0.0);
    }

    #[test]
    fn test_model_missing_surface() {
        let (mut model, option, snapshot) = model_with_option();
        model.surfaces.clear();
        assert!(matches!(
            model.synthetic_price(&option, &[], &snapshot),
            Err(ModelError::Domain(_))
        ));
    }
}
