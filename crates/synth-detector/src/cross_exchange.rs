//! Cross-exchange spread detector.
//!
//! Works off the per-exchange quote map in each snapshot. For every
//! instrument quoted on at least two venues it finds the cheapest ask and
//! richest bid, subtracts per-exchange taker fees, and emits when the net
//! spread clears the deviation threshold with adequate liquidity on both
//! sides.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use synth_core::{
    ExchangeId, InstrumentId, MarketSnapshot, MispricingKind, MispricingOpportunity, Quote,
};
use synth_pricing::confidence_score;

use crate::detector::{DetectionCallback, DetectorCore, MispricingDetector};
use crate::params::DetectionParameters;

/// A cross-exchange spread with its venue routing and execution estimates.
#[derive(Debug, Clone)]
pub struct CrossExchangeOpportunity {
    pub mispricing: MispricingOpportunity,
    pub buy_exchange: ExchangeId,
    pub sell_exchange: ExchangeId,
    /// Net profit after per-exchange taker fees, per unit.
    pub net_profit_after_costs: Decimal,
    /// Profit per unit of capital deployed.
    pub capital_efficiency: f64,
    /// Estimated fill probability from liquidity and quote age.
    pub execution_probability: f64,
}

/// Detects price dislocations for the same instrument across venues.
pub struct CrossExchangeDetector {
    core: DetectorCore,
    snapshot: Option<Arc<MarketSnapshot>>,
    /// Taker fee per exchange, in basis points.
    fees_bps: HashMap<ExchangeId, Decimal>,
    default_fee_bps: Decimal,
    /// Detailed results of the last pass.
    last_pass: Vec<CrossExchangeOpportunity>,
}

impl CrossExchangeDetector {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            core: DetectorCore::new(params),
            snapshot: None,
            fees_bps: HashMap::new(),
            default_fee_bps: Decimal::from(5),
            last_pass: Vec::new(),
        }
    }

    /// Set the taker fee for one exchange, in basis points.
    pub fn set_fee_bps(&mut self, exchange: ExchangeId, fee_bps: Decimal) {
        self.fees_bps.insert(exchange, fee_bps);
    }

    /// Fee applied when an exchange has no configured schedule.
    pub fn set_default_fee_bps(&mut self, fee_bps: Decimal) {
        self.default_fee_bps = fee_bps;
    }

    fn fee_bps(&self, exchange: &ExchangeId) -> Decimal {
        self.fees_bps
            .get(exchange)
            .copied()
            .unwrap_or(self.default_fee_bps)
    }

    /// Detailed opportunities from the most recent detection pass.
    pub fn last_pass(&self) -> &[CrossExchangeOpportunity] {
        &self.last_pass
    }

    fn check_instrument(
        &self,
        instrument: &InstrumentId,
        venues: &HashMap<ExchangeId, Quote>,
    ) -> Option<CrossExchangeOpportunity> {
        if venues.len() < 2 {
            return None;
        }
        let params = &self.core.params;

        let (buy_exchange, buy_quote) = venues
            .iter()
            .filter(|(_, q)| q.ask_price.is_positive())
            .min_by(|(ea, a), (eb, b)| a.ask_price.cmp(&b.ask_price).then(ea.cmp(eb)))?;
        let (sell_exchange, sell_quote) = venues
            .iter()
            .filter(|(_, q)| q.bid_price.is_positive())
            .max_by(|(ea, a), (eb, b)| a.bid_price.cmp(&b.bid_price).then(eb.cmp(ea)))?;
        if buy_exchange == sell_exchange {
            return None;
        }

        let buy_ask = buy_quote.ask_price.inner();
        let sell_bid = sell_quote.bid_price.inner();
        let gross = sell_bid - buy_ask;
        if gross <= Decimal::ZERO {
            return None;
        }

        // Liquidity must exist on both sides of the route.
        let size = buy_quote.ask_size.min(sell_quote.bid_size);
        if size.inner() < params.liquidity_threshold {
            DetectorCore::skip("insufficient_liquidity");
            return None;
        }

        let bps = Decimal::from(10_000);
        let costs = buy_ask * self.fee_bps(buy_exchange) / bps
            + sell_bid * self.fee_bps(sell_exchange) / bps;
        let net = gross - costs;
        let deviation = (net / buy_ask).to_f64()?;
        if deviation <= params.min_deviation_threshold {
            return None;
        }

        let snapshot = self.snapshot.as_ref()?;
        let confidence = confidence_score(
            &[buy_quote, sell_quote],
            snapshot.snapshot_time,
            DetectorCore::FRESHNESS_BUDGET_MS,
            params.max_spread_ratio,
            1.0,
        );
        if confidence <= params.min_confidence_level {
            DetectorCore::skip("low_confidence");
            return None;
        }

        // Capital buys the cheap leg; efficiency is profit per unit of it.
        let required_capital = size.notional(buy_quote.ask_price);
        let expected_profit = net * size.inner();
        let capital_efficiency = if required_capital > Decimal::ZERO {
            (expected_profit / required_capital).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        // Fill probability: full when both books hold several multiples of
        // the threshold, discounted by the staler leg's age.
        let liquidity_ratio = (size.inner() / params.liquidity_threshold.max(Decimal::ONE))
            .to_f64()
            .unwrap_or(0.0)
            .min(1.0);
        let worst_age_ms = (snapshot.snapshot_time - buy_quote.timestamp)
            .num_milliseconds()
            .max((snapshot.snapshot_time - sell_quote.timestamp).num_milliseconds())
            .max(0) as f64;
        let staleness_factor =
            (1.0 - worst_age_ms / DetectorCore::FRESHNESS_BUDGET_MS as f64).clamp(0.0, 1.0);
        let execution_probability = liquidity_ratio * staleness_factor;

        debug!(
            target_instrument = %instrument,
            buy = %buy_exchange,
            sell = %sell_exchange,
            %gross,
            %net,
            "Cross-exchange spread detected"
        );

        // A live executable spread needs no distributional significance;
        // the z-score mirrors the deviation scale for downstream sorting.
        let mispricing = MispricingOpportunity::new(
            instrument.clone(),
            vec![instrument.clone()],
            vec![1.0],
            MispricingKind::CrossExchange,
            buy_quote.ask_price,
            sell_quote.bid_price,
            deviation,
            f64::MAX,
            confidence,
            params.opportunity_ttl(),
        )
        .with_expected_profit(expected_profit);

        Some(CrossExchangeOpportunity {
            mispricing,
            buy_exchange: buy_exchange.clone(),
            sell_exchange: sell_exchange.clone(),
            net_profit_after_costs: net,
            capital_efficiency,
            execution_probability,
        })
    }
}

impl MispricingDetector for CrossExchangeDetector {
    fn name(&self) -> &'static str {
        "cross_exchange"
    }

    fn update_market_data(&mut self, snapshot: &Arc<MarketSnapshot>) {
        self.snapshot = Some(snapshot.clone());
        self.core.sweep_expired(snapshot.snapshot_time);
    }

    fn detect_opportunities(&mut self) -> Vec<MispricingOpportunity> {
        let Some(snapshot) = self.snapshot.clone() else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let mut detailed = Vec::new();
        for (instrument, venues) in &snapshot.exchange_quotes {
            if let Some(opportunity) = self.check_instrument(instrument, venues) {
                found.push(self.core.emit(opportunity.mispricing.clone()));
                detailed.push(opportunity);
            }
        }
        self.last_pass = detailed;
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
