//! WebSocket push listener.
//!
//! Owns the `Disconnected → Connecting → Connected` state machine and the
//! reconnect loop. State is published through a `watch` channel so the rest
//! of the engine reads one authoritative source of truth instead of
//! scattered booleans.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use till_remote::OrderSource;
use till_schemas::{OrderBatch, RemoteOrder, SyncChannel};

use crate::backoff::ReconnectBackoff;
use crate::event::{decode_event, PushEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Push channel connectivity, owned by the listener and exposed read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

// ---------------------------------------------------------------------------
// Config / handle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PushConfig {
    /// WebSocket endpoint, e.g. `wss://orders.example.com/v1/stream`.
    pub url: String,
    pub tenant_id: String,
    pub api_key: String,
    pub backoff: ReconnectBackoff,
}

/// Read-only view of a running listener.
pub struct PushHandle {
    state: watch::Receiver<ConnectionState>,
    last_event_at: watch::Receiver<Option<DateTime<Utc>>>,
    task: JoinHandle<()>,
}

impl PushHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A clone of the state channel for consumers that want to await
    /// transitions rather than poll.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        *self.last_event_at.borrow()
    }

    /// Wait for the listener task to finish (after shutdown is signalled).
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

enum ReadOutcome {
    Shutdown,
    Disconnected,
}

pub struct PushListener {
    config: PushConfig,
    source: Arc<dyn OrderSource>,
    batch_tx: mpsc::Sender<OrderBatch>,
    shutdown: watch::Receiver<bool>,
    state_tx: watch::Sender<ConnectionState>,
    last_event_tx: watch::Sender<Option<DateTime<Utc>>>,
}

impl PushListener {
    /// Spawn the listener task. It reconnects until `shutdown` flips to
    /// true, then exits with the state left at `Disconnected`.
    pub fn spawn(
        config: PushConfig,
        source: Arc<dyn OrderSource>,
        batch_tx: mpsc::Sender<OrderBatch>,
        shutdown: watch::Receiver<bool>,
    ) -> PushHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (last_event_tx, last_event_rx) = watch::channel(None);

        let listener = Self {
            config,
            source,
            batch_tx,
            shutdown,
            state_tx,
            last_event_tx,
        };
        let task = tokio::spawn(listener.run());

        PushHandle {
            state: state_rx,
            last_event_at: last_event_rx,
            task,
        }
    }

    async fn run(mut self) {
        let mut backoff = self.config.backoff.clone();

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            match self.connect_once().await {
                Ok(ws) => {
                    info!(url = %self.config.url, "push stream connected");
                    self.set_state(ConnectionState::Connected);
                    backoff.reset();

                    let outcome = self.read_loop(ws).await;
                    self.set_state(ConnectionState::Disconnected);
                    if matches!(outcome, ReadOutcome::Shutdown) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "push connect failed");
                    self.set_state(ConnectionState::Disconnected);
                }
            }

            let delay = backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "push reconnect backoff");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                res = self.shutdown.changed() => {
                    if res.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() != state {
            debug!(state = state.as_str(), "push state");
        }
        let _ = self.state_tx.send(state);
    }

    async fn connect_once(&self) -> Result<WsStream> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .context("invalid push url")?;
        let headers = request.headers_mut();
        headers.insert(
            "X-Tenant-Id",
            HeaderValue::from_str(&self.config.tenant_id).context("invalid tenant id header")?,
        );
        headers.insert(
            "X-Api-Key",
            HeaderValue::from_str(&self.config.api_key).context("invalid api key header")?,
        );

        let (ws, _resp) = tokio_tungstenite::connect_async(request)
            .await
            .context("push connect failed")?;
        Ok(ws)
    }

    async fn read_loop(&mut self, mut ws: WsStream) -> ReadOutcome {
        loop {
            tokio::select! {
                res = self.shutdown.changed() => {
                    if res.is_err() || *self.shutdown.borrow() {
                        let _ = ws.close(None).await;
                        return ReadOutcome::Shutdown;
                    }
                }
                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if self.handle_text(&text).await.is_err() {
                                // Reconciler queue is gone — the engine is
                                // shutting down underneath us.
                                return ReadOutcome::Shutdown;
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("push stream closed by remote");
                            return ReadOutcome::Disconnected;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "push stream error");
                            return ReadOutcome::Disconnected;
                        }
                    }
                }
            }
        }
    }

    /// Decode one text frame and forward the resulting order, if any.
    ///
    /// Errors are contained here: a malformed event or a failed hydration
    /// is logged and skipped (poll re-discovers the order). The only hard
    /// error is a closed batch queue.
    async fn handle_text(&self, text: &str) -> Result<(), ()> {
        let order = match decode_event(text) {
            Ok(PushEvent::OrderCreated(order)) => *order,
            Ok(PushEvent::OrderCreatedId(remote_id)) => {
                match self.source.fetch_by_id(&remote_id).await {
                    Ok(Some(order)) => order,
                    Ok(None) => {
                        warn!(remote_id = %remote_id, "push event id unknown to platform");
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(remote_id = %remote_id, error = %e, "push event hydration failed");
                        return Ok(());
                    }
                }
            }
            Ok(PushEvent::Ignored) => return Ok(()),
            Err(e) => {
                warn!(error = %e, "skipping malformed push event");
                return Ok(());
            }
        };

        self.forward(order).await
    }

    async fn forward(&self, order: RemoteOrder) -> Result<(), ()> {
        let _ = self.last_event_tx.send(Some(Utc::now()));
        self.batch_tx
            .send(OrderBatch::new(SyncChannel::Push, vec![order]))
            .await
            .map_err(|_| ())
    }
}
