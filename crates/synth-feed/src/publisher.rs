//! Snapshot publication.
//!
//! Snapshots go out through a `tokio::sync::watch` channel: consumers only
//! ever see the newest undelivered snapshot, which is the latest-wins
//! backpressure policy — slow detectors skip intermediate snapshots rather
//! than queueing them.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use synth_core::MarketSnapshot;
use synth_telemetry::metrics;

use crate::aggregator::FeedAggregator;
use crate::error::{FeedError, FeedResult};

/// Periodic (or on-demand) snapshot publisher over a watch channel.
pub struct SnapshotPublisher {
    aggregator: Arc<FeedAggregator>,
    tx: watch::Sender<Arc<MarketSnapshot>>,
}

impl SnapshotPublisher {
    pub fn new(aggregator: Arc<FeedAggregator>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(MarketSnapshot::default()));
        Self { aggregator, tx }
    }

    /// New consumer handle; sees only the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MarketSnapshot>> {
        self.tx.subscribe()
    }

    /// Build and publish one snapshot now.
    ///
    /// A fully stale feed publishes nothing and surfaces `FeedError::Stale`
    /// so callers can count the skipped pass.
    pub fn publish_now(&self) -> FeedResult<Arc<MarketSnapshot>> {
        match self.aggregator.snapshot() {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.tx.send_replace(snapshot.clone());
                metrics::SNAPSHOTS_PUBLISHED.inc();
                Ok(snapshot)
            }
            Err(err) => {
                if matches!(err, FeedError::Stale { .. }) {
                    metrics::STALE_FEED_PASSES.inc();
                }
                Err(err)
            }
        }
    }

    /// Publish on the configured tick interval until cancelled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.aggregator.config().tick_interval());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_ms = self.aggregator.config().tick_interval_ms,
            "Snapshot publisher started"
        );
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(err) = self.publish_now() {
                        debug!(%err, "Snapshot publication skipped");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Snapshot publisher stopped");
                        return;
                    }
                }
            }
        }
    }
}
