//! Shared runtime state for till-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The daemon owns no
//! sync logic: the event bus and the health monitor are handed in by the
//! engine, and everything here is read-only over them.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use till_sync::{HealthMonitor, SyncEvent};

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (via Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Engine event bus, re-broadcast to SSE subscribers.
    pub bus: broadcast::Sender<SyncEvent>,
    pub build: BuildInfo,
    /// Read-only sync health aggregator.
    pub health: HealthMonitor,
    /// Store handle for read-only order listings.
    pub pool: SqlitePool,
}

impl AppState {
    pub fn new(bus: broadcast::Sender<SyncEvent>, health: HealthMonitor, pool: SqlitePool) -> Self {
        Self {
            bus,
            build: BuildInfo {
                service: "till-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            health,
            pool,
        }
    }
}
