//! Engine wiring: spawn the channels and the reconciler, hand back a
//! shutdown-capable handle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use till_config::{SyncSettings, TenantCredentials};
use till_push::{PushConfig, PushHandle, PushListener, ReconnectBackoff};
use till_remote::{HttpOrderSource, OrderSource};

use crate::checkpoint::CheckpointWatermark;
use crate::health::HealthMonitor;
use crate::poller::PollScheduler;
use crate::reconciler::Reconciler;
use crate::window::WindowPolicy;
use crate::SyncEvent;

/// Capacity of the reconciler queue. Bounded so a slow disk back-pressures
/// the producers instead of growing memory without bound.
const BATCH_QUEUE_CAPACITY: usize = 64;

/// How often the health monitor pushes a snapshot onto the event bus
/// between batches.
const HEALTH_TICK: Duration = Duration::from_secs(5);

pub struct SyncEngine;

impl SyncEngine {
    /// Start the engine against the production HTTP order source.
    ///
    /// Configuration problems (bad timezone, missing endpoints, both
    /// channels disabled) fail here, before any task is spawned.
    pub async fn start(
        pool: SqlitePool,
        settings: SyncSettings,
        credentials: TenantCredentials,
    ) -> Result<EngineHandle> {
        let source = HttpOrderSource::new(
            settings.remote_base_url.clone(),
            settings.tenant_id.clone(),
            credentials.api_key.clone(),
            credentials.api_secret.clone(),
        )
        .map_err(|e| anyhow!("order source construction failed: {e}"))?;

        Self::start_with_source(pool, settings, credentials, Arc::new(source)).await
    }

    /// Start the engine with an injected order source. Production goes
    /// through [`SyncEngine::start`]; tests inject a fixture source here.
    pub async fn start_with_source(
        pool: SqlitePool,
        settings: SyncSettings,
        credentials: TenantCredentials,
        source: Arc<dyn OrderSource>,
    ) -> Result<EngineHandle> {
        if !settings.push_enabled && !settings.poll_enabled {
            bail!("CONFIG_INVALID: both sync channels are disabled");
        }
        let policy = WindowPolicy::from_settings(&settings)?;

        let checkpoint = till_db::checkpoint_get(&pool, &settings.tenant_id)
            .await
            .context("checkpoint read at startup failed")?;
        let watermark = CheckpointWatermark::seeded(checkpoint.map(|c| c.last_synced_at));

        let (batch_tx, batch_rx) = mpsc::channel(BATCH_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events, _) = broadcast::channel::<SyncEvent>(1024);

        let push = if settings.push_enabled {
            Some(PushListener::spawn(
                PushConfig {
                    url: settings.push_url.clone(),
                    tenant_id: settings.tenant_id.clone(),
                    api_key: credentials.api_key.clone(),
                    backoff: ReconnectBackoff::default(),
                },
                Arc::clone(&source),
                batch_tx.clone(),
                shutdown_rx.clone(),
            ))
        } else {
            None
        };

        let health = HealthMonitor::new(
            pool.clone(),
            settings.tenant_id.clone(),
            push.as_ref().map(|h| h.state_receiver()),
        );

        let reconciler = Reconciler::new(
            pool.clone(),
            settings.tenant_id.clone(),
            batch_rx,
            events.clone(),
            health.clone(),
            watermark,
        );
        let reconciler_task = tokio::spawn(reconciler.run());

        let poll_task = if settings.poll_enabled {
            Some(PollScheduler::spawn(
                pool.clone(),
                settings.tenant_id.clone(),
                Arc::clone(&source),
                policy,
                Duration::from_secs(settings.poll_interval_secs),
                batch_tx.clone(),
                shutdown_rx.clone(),
            ))
        } else {
            None
        };

        // The channel tasks own the only senders now; when they exit the
        // queue closes and the reconciler drains out.
        drop(batch_tx);

        let health_tick_task =
            spawn_health_tick(health.clone(), events.clone(), HEALTH_TICK, shutdown_rx);

        info!(
            tenant = %settings.tenant_id,
            push_enabled = settings.push_enabled,
            poll_enabled = settings.poll_enabled,
            poll_interval_secs = settings.poll_interval_secs,
            "sync engine started"
        );

        Ok(EngineHandle {
            events,
            health,
            shutdown_tx,
            push,
            poll_task,
            reconciler_task,
            health_tick_task,
        })
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Running engine handle. Dropping it without calling
/// [`EngineHandle::shutdown`] aborts nothing — tasks keep running — so the
/// owner is expected to shut down explicitly.
pub struct EngineHandle {
    events: broadcast::Sender<SyncEvent>,
    health: HealthMonitor,
    shutdown_tx: watch::Sender<bool>,
    push: Option<PushHandle>,
    poll_task: Option<JoinHandle<()>>,
    reconciler_task: JoinHandle<()>,
    health_tick_task: JoinHandle<()>,
}

impl EngineHandle {
    /// Subscribe to engine events (new-order notifications, health).
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// The bus itself, for bridging into another fan-out (e.g. SSE).
    pub fn events_sender(&self) -> broadcast::Sender<SyncEvent> {
        self.events.clone()
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// Push connectivity, if the push channel is enabled.
    pub fn push_state(&self) -> Option<till_push::ConnectionState> {
        self.push.as_ref().map(|h| h.state())
    }

    /// Graceful shutdown: stop both channel loops, then wait for the
    /// reconciler to finish writing every batch it had already accepted.
    /// Batches never submitted are dropped — the next startup's
    /// gap-recovery window re-discovers them.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);

        if let Some(push) = self.push {
            push.join().await;
        }
        if let Some(poll) = self.poll_task {
            let _ = poll.await;
        }
        // All producers are gone; the queue closes and the reconciler
        // drains whatever was accepted before exiting.
        let _ = self.reconciler_task.await;
        let _ = self.health_tick_task.await;

        info!("sync engine stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Health tick
// ---------------------------------------------------------------------------

/// Periodic health broadcast between batches, so dashboards see push
/// disconnects even while no orders flow.
fn spawn_health_tick(
    health: HealthMonitor,
    events: broadcast::Sender<SyncEvent>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match health.snapshot().await {
                        Ok(snapshot) => {
                            let _ = events.send(SyncEvent::Health(snapshot));
                        }
                        Err(e) => warn!(error = %e, "health tick snapshot failed"),
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
