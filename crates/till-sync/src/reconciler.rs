//! The sync reconciler: single writer to the order store.
//!
//! Batches from both channels arrive on one queue, so the per-order
//! existence-check-then-insert sequence is serialized process-wide — the
//! property that stops two channels from both observing an order as absent
//! and both inserting it. Each order is one store transaction; the store is
//! never held across a whole batch, only across a single order's
//! check-and-insert.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use till_db::UpsertOutcome;
use till_schemas::OrderBatch;

use crate::checkpoint::CheckpointWatermark;
use crate::health::HealthMonitor;
use crate::SyncEvent;

pub struct Reconciler {
    pool: sqlx::SqlitePool,
    tenant_id: String,
    batch_rx: mpsc::Receiver<OrderBatch>,
    events: broadcast::Sender<SyncEvent>,
    health: HealthMonitor,
    watermark: CheckpointWatermark,
}

impl Reconciler {
    pub fn new(
        pool: sqlx::SqlitePool,
        tenant_id: impl Into<String>,
        batch_rx: mpsc::Receiver<OrderBatch>,
        events: broadcast::Sender<SyncEvent>,
        health: HealthMonitor,
        watermark: CheckpointWatermark,
    ) -> Self {
        Self {
            pool,
            tenant_id: tenant_id.into(),
            batch_rx,
            events,
            health,
            watermark,
        }
    }

    /// Process batches until every producer has dropped its sender and the
    /// queue is drained. That close-then-drain semantic is the graceful
    /// shutdown contract: batches already accepted are always written.
    pub async fn run(mut self) {
        while let Some(batch) = self.batch_rx.recv().await {
            self.process_batch(batch).await;
        }
        debug!("reconciler drained; exiting");
    }

    async fn process_batch(&mut self, batch: OrderBatch) {
        if batch.is_empty() {
            return;
        }

        let batch_id = Uuid::new_v4();
        let channel = batch.channel;
        let mut newly_inserted = 0usize;
        let mut max_synced_at = None;

        // OrderBatch sorts on construction; iteration is created_at
        // ascending.
        for order in &batch.orders {
            match till_db::upsert_order_synced(&self.pool, order).await {
                Ok(outcome) => {
                    match outcome {
                        UpsertOutcome::Inserted { .. } => newly_inserted += 1,
                        UpsertOutcome::Retried { .. } => {
                            info!(
                                remote_id = %order.remote_id,
                                "completed previously failed order"
                            );
                        }
                        UpsertOutcome::AlreadyPresent => {
                            debug!(
                                remote_id = %order.remote_id,
                                channel = channel.as_str(),
                                "duplicate observation; no-op"
                            );
                        }
                    }
                    // Every non-error outcome is durably Synced now; a
                    // crash between a past insert and its checkpoint
                    // advance catches up here.
                    if max_synced_at.map_or(true, |m| order.created_at > m) {
                        max_synced_at = Some(order.created_at);
                    }
                }
                Err(e) => {
                    warn!(
                        remote_id = %order.remote_id,
                        error = %e,
                        "order persistence failed; marking Failed"
                    );
                    // Best effort: the next poll window retries the order
                    // whether or not the marker itself lands.
                    if let Err(mark_err) =
                        till_db::mark_order_failed(&self.pool, order, &e.to_string()).await
                    {
                        warn!(
                            remote_id = %order.remote_id,
                            error = %mark_err,
                            "failed to record failure marker"
                        );
                    }
                }
            }
        }

        if let Some(ts) = max_synced_at {
            if self.watermark.advance(ts) {
                match till_db::checkpoint_advance(&self.pool, &self.tenant_id, ts, channel).await {
                    Ok(true) => {
                        debug!(last_synced_at = %ts, channel = channel.as_str(), "checkpoint advanced")
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "checkpoint persistence failed"),
                }
            }
        }

        self.health.note_batch().await;

        if newly_inserted > 0 {
            info!(
                batch_id = %batch_id,
                channel = channel.as_str(),
                new_orders = newly_inserted,
                batch_size = batch.len(),
                "new orders synced"
            );
            let _ = self.events.send(SyncEvent::NewOrders {
                count: newly_inserted,
                channel,
            });
        }

        match self.health.snapshot().await {
            Ok(snapshot) => {
                let _ = self.events.send(SyncEvent::Health(snapshot));
            }
            Err(e) => warn!(error = %e, "health snapshot failed"),
        }
    }
}
