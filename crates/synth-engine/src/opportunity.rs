//! Arbitrage opportunity records.
//!
//! An opportunity is a sized, risk-annotated trading plan derived from a
//! mispricing. Its status moves through a monotonic state machine; no
//! transition may return to an earlier state.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use synth_core::{InstrumentId, MispricingKind, MispricingOpportunity, Price, Side, Size};

use crate::error::{EngineError, EngineResult};

/// Lifecycle states.
///
/// `Completed`, `Failed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Identified,
    Validated,
    Executing,
    Completed,
    Failed,
    Expired,
}

impl OpportunityStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }

    /// Legal transitions:
    /// `Identified -> Validated -> Executing -> Completed`,
    /// `Identified -> Failed`, and any non-terminal state `-> Expired`.
    pub fn can_transition(&self, to: OpportunityStatus) -> bool {
        use OpportunityStatus::*;
        matches!(
            (self, to),
            (Identified, Validated)
                | (Identified, Failed)
                | (Validated, Executing)
                | (Executing, Completed)
                | (Identified, Expired)
                | (Validated, Expired)
                | (Executing, Expired)
        )
    }
}

impl fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Identified => "identified",
            Self::Validated => "validated",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// One leg of an opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageLeg {
    pub instrument: InstrumentId,
    pub side: Side,
    pub size: Size,
    pub entry_price: Price,
    pub exit_price: Option<Price>,
    /// Signed contribution to the package (+1 primary, -w hedges).
    pub weight: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
}

impl ArbitrageLeg {
    pub fn new(
        instrument: InstrumentId,
        side: Side,
        size: Size,
        entry_price: Price,
        weight: f64,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument,
            side,
            size,
            entry_price,
            exit_price: None,
            weight,
            entry_time,
            exit_time: None,
        }
    }

    pub fn notional(&self) -> Decimal {
        self.size.notional(self.entry_price)
    }
}

/// A sized, risk-annotated, validated (or failing) trading plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub id: String,
    pub kind: MispricingKind,
    pub status: OpportunityStatus,
    pub legs: Vec<ArbitrageLeg>,
    /// The mispricing this plan was derived from.
    pub source: MispricingOpportunity,

    // Financial metrics.
    pub expected_profit: Decimal,
    pub max_loss: Decimal,
    pub break_even_price: Price,
    /// Sum of size * entry_price over legs, computed at construction.
    pub total_cost: Decimal,
    /// Sum of weight * entry_price * size over legs.
    pub net_exposure: Decimal,

    // Risk metrics.
    pub value_at_risk: Decimal,
    pub expected_shortfall: Decimal,
    pub sharpe_estimate: f64,
    pub correlation_risk: f64,
    pub max_drawdown: f64,

    // Timing.
    pub identified_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub estimated_duration_secs: u64,

    // Execution estimates.
    pub slippage_estimate: f64,
    pub transaction_cost: Decimal,
    pub total_volume: Decimal,
    pub market_impact: f64,
}

impl ArbitrageOpportunity {
    /// Assemble a record from its legs; `total_cost` and `net_exposure`
    /// are derived here so every construction path populates them before
    /// validation reads them.
    #[allow(clippy::too_many_arguments)]
    pub fn from_legs(
        id: String,
        source: MispricingOpportunity,
        legs: Vec<ArbitrageLeg>,
        expected_profit: Decimal,
        max_loss: Decimal,
        estimated_duration_secs: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let total_cost: Decimal = legs.iter().map(ArbitrageLeg::notional).sum();
        let net_exposure: Decimal = legs
            .iter()
            .map(|leg| {
                Decimal::from_f64_retain(leg.weight).unwrap_or(Decimal::ZERO)
                    * leg.entry_price.inner()
                    * leg.size.inner()
            })
            .sum();
        let total_volume: Decimal = legs.iter().map(|leg| leg.size.inner().abs()).sum();
        let break_even_price = legs
            .first()
            .map(|leg| leg.entry_price)
            .unwrap_or(Price::ZERO);

        Self {
            id,
            kind: source.kind,
            status: OpportunityStatus::Identified,
            expires_at: source.expires_at,
            source,
            expected_profit,
            max_loss,
            break_even_price,
            total_cost,
            net_exposure,
            value_at_risk: Decimal::ZERO,
            expected_shortfall: Decimal::ZERO,
            sharpe_estimate: 0.0,
            correlation_risk: 0.0,
            max_drawdown: 0.0,
            identified_at: now,
            validated_at: None,
            estimated_duration_secs,
            slippage_estimate: 0.0,
            transaction_cost: Decimal::ZERO,
            total_volume,
            market_impact: 0.0,
            legs,
        }
    }

    /// Move to a new status, enforcing the monotonic state machine.
    pub fn transition(&mut self, to: OpportunityStatus) -> EngineResult<()> {
        if !self.status.can_transition(to) {
            return Err(EngineError::IllegalTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        if to == OpportunityStatus::Validated {
            self.validated_at = Some(Utc::now());
        }
        self.status = to;
        Ok(())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Remaining lifetime at `now`.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Check the leg/exposure consistency invariant within `epsilon`.
    pub fn exposure_consistent(&self, epsilon: Decimal) -> bool {
        let recomputed: Decimal = self
            .legs
            .iter()
            .map(|leg| {
                Decimal::from_f64_retain(leg.weight).unwrap_or(Decimal::ZERO)
                    * leg.entry_price.inner()
                    * leg.size.inner()
            })
            .sum();
        (recomputed - self.net_exposure).abs() <= epsilon
    }
}
