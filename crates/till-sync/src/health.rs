//! Read-only sync health aggregation.
//!
//! The monitor owns no state the engine depends on — it reads the push
//! state channel, the checkpoint row, and the status counts, and folds
//! them into one snapshot for dashboards. No write access to any store.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::{watch, RwLock};

use till_push::ConnectionState;
use till_schemas::{SyncChannel, SyncStatus};

/// Point-in-time view of the sync engine, serialized to dashboards as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub push_state: ConnectionState,
    pub push_connected: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_channel: Option<SyncChannel>,
    pub pending_count: i64,
    pub failed_count: i64,
    /// When the reconciler last completed a batch (either channel).
    pub last_batch_at: Option<DateTime<Utc>>,
}

/// Cloneable read-only aggregator.
#[derive(Clone)]
pub struct HealthMonitor {
    pool: SqlitePool,
    tenant_id: String,
    push_state: Option<watch::Receiver<ConnectionState>>,
    last_batch_at: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl HealthMonitor {
    /// `push_state` is `None` when the push channel is disabled; the
    /// snapshot then reports Disconnected.
    pub fn new(
        pool: SqlitePool,
        tenant_id: impl Into<String>,
        push_state: Option<watch::Receiver<ConnectionState>>,
    ) -> Self {
        Self {
            pool,
            tenant_id: tenant_id.into(),
            push_state,
            last_batch_at: Arc::new(RwLock::new(None)),
        }
    }

    /// Record that a batch just finished. Called by the reconciler only.
    pub(crate) async fn note_batch(&self) {
        *self.last_batch_at.write().await = Some(Utc::now());
    }

    pub async fn snapshot(&self) -> Result<HealthSnapshot> {
        let push_state = self
            .push_state
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(ConnectionState::Disconnected);

        let checkpoint = till_db::checkpoint_get(&self.pool, &self.tenant_id).await?;
        let pending_count = till_db::count_by_status(&self.pool, SyncStatus::Pending).await?;
        let failed_count = till_db::count_by_status(&self.pool, SyncStatus::Failed).await?;

        Ok(HealthSnapshot {
            push_state,
            push_connected: push_state.is_connected(),
            last_synced_at: checkpoint.as_ref().map(|c| c.last_synced_at),
            last_channel: checkpoint.as_ref().map(|c| c.last_channel),
            pending_count,
            failed_count,
            last_batch_at: *self.last_batch_at.read().await,
        })
    }
}
