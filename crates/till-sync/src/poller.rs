//! Interval poll scheduler.
//!
//! Runs unconditionally on a fixed interval regardless of push
//! connectivity — polling is the resilience backstop, not a fallback
//! triggered by push failure, so there is no second failure-detection
//! problem. Redundant fetches are cheap because reconciliation is
//! idempotent.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use till_remote::OrderSource;
use till_schemas::{OrderBatch, SyncChannel};

use crate::window::WindowPolicy;

pub struct PollScheduler {
    pool: sqlx::SqlitePool,
    tenant_id: String,
    source: Arc<dyn OrderSource>,
    policy: WindowPolicy,
    interval: Duration,
    batch_tx: mpsc::Sender<OrderBatch>,
    shutdown: watch::Receiver<bool>,
}

impl PollScheduler {
    pub fn spawn(
        pool: sqlx::SqlitePool,
        tenant_id: impl Into<String>,
        source: Arc<dyn OrderSource>,
        policy: WindowPolicy,
        interval: Duration,
        batch_tx: mpsc::Sender<OrderBatch>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let scheduler = Self {
            pool,
            tenant_id: tenant_id.into(),
            source,
            policy,
            interval,
            batch_tx,
            shutdown,
        };
        tokio::spawn(scheduler.run())
    }

    async fn run(mut self) {
        // The first tick fires immediately, which doubles as the startup
        // gap-recovery pass.
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.tick().await.is_err() {
                        // Reconciler queue closed: engine is shutting down.
                        break;
                    }
                }
                res = self.shutdown.changed() => {
                    if res.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("poll scheduler stopped");
    }

    /// One poll pass. Returns `Err` only when the batch queue is closed;
    /// fetch and checkpoint errors are contained to this tick.
    async fn tick(&self) -> Result<(), ()> {
        let checkpoint = match till_db::checkpoint_get(&self.pool, &self.tenant_id).await {
            Ok(cp) => cp.map(|c| c.last_synced_at),
            Err(e) => {
                warn!(error = %e, "poll tick: checkpoint read failed; skipping");
                return Ok(());
            }
        };

        let window_start = self.policy.window_start(checkpoint, Utc::now());
        let orders = match self.source.fetch_since(window_start).await {
            Ok(orders) => orders,
            Err(e) => {
                // Absence of data, not a fault: the next tick retries.
                warn!(error = %e, window_start = %window_start, "poll fetch failed");
                return Ok(());
            }
        };

        debug!(
            window_start = %window_start,
            fetched = orders.len(),
            "poll tick"
        );

        if orders.is_empty() {
            return Ok(());
        }

        self.batch_tx
            .send(OrderBatch::new(SyncChannel::Poll, orders))
            .await
            .map_err(|_| ())
    }
}
