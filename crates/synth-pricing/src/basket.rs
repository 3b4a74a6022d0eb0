//! Weighted basket model.
//!
//! Synthetic basket price is the exact weighted sum of component mids.
//! Portfolio volatility comes from the correlation-scaled covariance of
//! component return histories: `sigma_p^2 = w' C w`.

use std::collections::HashMap;

use rust_decimal::Decimal;

use synth_core::{InstrumentId, MarketSnapshot, Price, Quote, SyntheticPrice};

use crate::confidence::confidence_score;
use crate::error::{ModelError, ModelResult};
use crate::history::PriceHistory;
use crate::model::{ModelParameters, PricingModel};

/// Prices configured baskets of instruments.
pub struct BasketModel {
    params: ModelParameters,
    baskets: HashMap<InstrumentId, Vec<(InstrumentId, f64)>>,
    history: PriceHistory,
}

impl BasketModel {
    pub fn new(params: ModelParameters) -> Self {
        let window = params.lookback_period;
        Self {
            params,
            baskets: HashMap::new(),
            history: PriceHistory::new(window),
        }
    }

    /// Define a basket; weights are normalized to sum to 1.
    pub fn define_basket(
        &mut self,
        id: InstrumentId,
        components: Vec<(InstrumentId, f64)>,
    ) -> ModelResult<()> {
        if components.is_empty() {
            return Err(ModelError::Domain("empty basket".into()));
        }
        let total: f64 = components.iter().map(|(_, w)| w).sum();
        if total.abs() <= f64::EPSILON {
            return Err(ModelError::Domain("basket weights sum to zero".into()));
        }
        let normalized = components
            .into_iter()
            .map(|(c, w)| (c, w / total))
            .collect();
        self.baskets.insert(id, normalized);
        Ok(())
    }

    fn basket(&self, id: &InstrumentId) -> ModelResult<&[(InstrumentId, f64)]> {
        self.baskets
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| ModelError::UnknownInstrument(id.clone()))
    }

    /// Annualized portfolio volatility via `sigma_p^2 = w' C w`, where
    /// `C_ij = rho_ij * sigma_i * sigma_j` from the history cache.
    ///
    /// Unknown correlations fall back to 1.0 on the diagonal's
    /// conservative side, unknown vols exclude the pair.
    pub fn portfolio_volatility(&self, components: &[(InstrumentId, f64)]) -> Option<f64> {
        let n = components.len();
        if n == 0 {
            return None;
        }
        let vols: Vec<f64> = components
            .iter()
            .map(|(c, _)| self.history.realized_vol(c))
            .collect::<Option<Vec<_>>>()?;

        let mut variance = 0.0;
        for i in 0..n {
            for j in 0..n {
                let rho = if i == j {
                    1.0
                } else {
                    self.history
                        .correlation(&components[i].0, &components[j].0)
                        .unwrap_or(1.0)
                };
                variance += components[i].1 * components[j].1 * rho * vols[i] * vols[j];
            }
        }
        Some(variance.max(0.0).sqrt())
    }

    /// Portfolio volatility for a configured basket.
    pub fn basket_volatility(&self, id: &InstrumentId) -> Option<f64> {
        let components = self.baskets.get(id)?;
        self.portfolio_volatility(components)
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }
}

impl PricingModel for BasketModel {
    fn name(&self) -> &'static str {
        "basket"
    }

    fn ingest(&mut self, snapshot: &MarketSnapshot) {
        self.history.observe(snapshot);
    }

    fn synthetic_price(
        &self,
        target: &InstrumentId,
        components: &[InstrumentId],
        snapshot: &MarketSnapshot,
    ) -> ModelResult<SyntheticPrice> {
        // A configured basket wins; otherwise fall back to equal weights
        // over the supplied components.
        let weighted: Vec<(InstrumentId, f64)> = if let Ok(basket) = self.basket(target) {
            basket.to_vec()
        } else if !components.is_empty() {
            let w = 1.0 / components.len() as f64;
            components.iter().map(|c| (c.clone(), w)).collect()
        } else {
            return Err(ModelError::UnknownInstrument(target.clone()));
        };

        let mut theoretical = Decimal::ZERO;
        let mut bid = Decimal::ZERO;
        let mut ask = Decimal::ZERO;
        let mut quotes: Vec<&Quote> = Vec::with_capacity(weighted.len());
        let mut sample_ratio = 1.0f64;
        for (component, weight) in &weighted {
            let quote = snapshot
                .quote(component)
                .ok_or_else(|| ModelError::UnknownInstrument(component.clone()))?;
            let w = Decimal::from_f64_retain(*weight)
                .ok_or_else(|| ModelError::Domain(format!("bad weight {weight}")))?;
            theoretical += quote.mid().inner() * w;
            // Negative weights flip which side of the component book the
            // basket consumes.
            if *weight >= 0.0 {
                bid += quote.bid_price.inner() * w;
                ask += quote.ask_price.inner() * w;
            } else {
                bid += quote.ask_price.inner() * w;
                ask += quote.bid_price.inner() * w;
            }
            quotes.push(quote);
            sample_ratio = sample_ratio.min(self.history.sample_ratio(component));
        }

        let confidence = confidence_score(
            &quotes,
            snapshot.snapshot_time,
            self.params.staleness_budget_ms,
            self.params.max_spread_ratio,
            sample_ratio,
        );

        let (ids, weights): (Vec<InstrumentId>, Vec<f64>) = weighted.into_iter().unzip();
        Ok(SyntheticPrice::new(
            Price::new(theoretical),
            Price::new(bid),
            Price::new(ask),
            confidence,
            ids,
            weights,
        )?)
    }

    fn weights(
        &self,
        instruments: &[InstrumentId],
        _snapshot: &MarketSnapshot,
    ) -> ModelResult<Vec<f64>> {
        if instruments.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![1.0 / instruments.len() as f64; instruments.len()])
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
