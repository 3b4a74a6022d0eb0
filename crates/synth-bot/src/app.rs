//! Pipeline assembly and the per-tick drive loop.
//!
//! Wiring follows the data flow: exchange events feed the aggregator,
//! snapshots fan into the composite detector (whose children own their
//! pricing models), and detected mispricings feed the arbitrage engine.

use std::path::Path;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use synth_core::{ExchangeId, InstrumentId, MarketSnapshot};
use synth_detector::{
    BasisDetector, BasisPair, CompositeDetector, CrossExchangeDetector, DetectionCallback,
    MispricingDetector, SpotDerivativeDetector, StatisticalDetector, Triangle, TriangularDetector,
    VolatilityDetector,
};
use synth_engine::{
    ArbitrageEngine, ArbitrageOpportunity, OpportunityCallback, RandomIdGenerator,
};
use synth_feed::{FeedAggregator, FeedError, FeedEvent, SnapshotPublisher};
use synth_pricing::{BasketModel, PerpetualBasisModel};
use synth_risk::PositionSizer;

use crate::config::AppConfig;
use crate::error::AppResult;

/// The assembled feed -> detector -> engine pipeline.
pub struct Pipeline {
    aggregator: Arc<FeedAggregator>,
    publisher: SnapshotPublisher,
    detector: CompositeDetector,
    engine: ArbitrageEngine,
}

impl Pipeline {
    /// Assemble every stage from configuration.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let aggregator = Arc::new(FeedAggregator::new(config.feed.clone()));
        let publisher = SnapshotPublisher::new(aggregator.clone());

        let mut composite = CompositeDetector::new();
        composite.add(Box::new(StatisticalDetector::new(config.detection.clone())));

        let mut triangular = TriangularDetector::new(config.detection.clone());
        for t in &config.triangles {
            triangular.register_triangle(Triangle::new(
                t.name.clone(),
                InstrumentId::new(t.pair_ab.clone()),
                InstrumentId::new(t.pair_bc.clone()),
                InstrumentId::new(t.pair_ac.clone()),
            ));
        }
        composite.add(Box::new(triangular));

        composite.add(Box::new(VolatilityDetector::new(config.detection.clone())));

        let mut basis = BasisDetector::new(
            config.detection.clone(),
            Box::new(PerpetualBasisModel::new(config.models.clone())),
        );
        for pair in &config.basis_pairs {
            basis.register_pair(BasisPair::new(
                InstrumentId::new(pair.spot.clone()),
                InstrumentId::new(pair.derivative.clone()),
            ));
        }
        composite.add(Box::new(basis));

        let mut cross_exchange = CrossExchangeDetector::new(config.detection.clone());
        for fee in &config.exchange_fees {
            cross_exchange.set_fee_bps(
                ExchangeId::new(fee.exchange.clone()),
                Decimal::from(fee.taker_fee_bps),
            );
        }
        composite.add(Box::new(cross_exchange));

        let mut spot_derivative = SpotDerivativeDetector::new(
            config.detection.clone(),
            Box::new(PerpetualBasisModel::new(config.models.clone())),
        );
        for pair in &config.basis_pairs {
            spot_derivative.watch(
                InstrumentId::new(pair.derivative.clone()),
                InstrumentId::new(pair.spot.clone()),
            );
        }
        composite.add(Box::new(spot_derivative));

        let mut engine = ArbitrageEngine::new(
            config.arbitrage,
            PositionSizer::new(config.risk),
            BasketModel::new(config.models.clone()),
            Box::new(RandomIdGenerator::new()),
        );
        engine.set_portfolio_state(config.portfolio_value, 0.0, 0.0);

        Ok(Self {
            aggregator,
            publisher,
            detector: composite,
            engine,
        })
    }

    /// Feed one normalized exchange event in.
    pub fn apply(&self, exchange: &ExchangeId, event: FeedEvent) {
        self.aggregator.apply(exchange, event);
    }

    pub fn aggregator(&self) -> &Arc<FeedAggregator> {
        &self.aggregator
    }

    /// Register the consumer callback for validated opportunities.
    pub fn on_opportunity(&mut self, callback: OpportunityCallback) {
        self.engine.set_validated_callback(callback);
    }

    /// Register a callback for raw mispricing detections (pre-engine).
    pub fn on_mispricing(&mut self, callback: DetectionCallback) {
        self.detector.set_detection_callback(callback);
    }

    /// One pipeline pass over an already-published snapshot.
    pub fn process_snapshot(&mut self, snapshot: &Arc<MarketSnapshot>) -> Vec<ArbitrageOpportunity> {
        // Snapshot-derived model parameters first, then detection, then
        // promotion; the engine sweep also runs here.
        self.engine.ingest(snapshot);
        self.detector.update_market_data(snapshot);
        let mispricings = self.detector.detect_opportunities();
        self.engine.identify_opportunities(&mispricings, snapshot)
    }

    /// Publish a snapshot and run one full pass.
    ///
    /// A fully stale feed skips the pass and yields nothing.
    pub fn tick(&mut self) -> Vec<ArbitrageOpportunity> {
        match self.publisher.publish_now() {
            Ok(snapshot) => self.process_snapshot(&snapshot),
            Err(FeedError::Stale { known }) => {
                debug!(known, "Detection pass skipped: feed stale");
                Vec::new()
            }
            Err(err) => {
                debug!(%err, "Snapshot unavailable");
                Vec::new()
            }
        }
    }

    /// Drive the pipeline on the configured tick until ctrl-c.
    pub async fn run(mut self) -> AppResult<()> {
        let mut tick = tokio::time::interval(self.aggregator.config().tick_interval());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("Pipeline started");
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let validated = self.tick();
                    for op in &validated {
                        info!(id = %op.id, kind = %op.kind, "Opportunity ready for execution");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Pipeline stopped");
                    return Ok(());
                }
            }
        }
    }
}

/// Convenience: assemble a pipeline straight from a config file.
pub fn pipeline_from_file(path: &Path) -> AppResult<Pipeline> {
    let config = AppConfig::load(path)?;
    Pipeline::from_config(&config)
}
