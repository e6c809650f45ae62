//! Scenario: push listener end to end against a local WebSocket server.
//!
//! # Invariants under test
//!
//! 1. The listener reaches Connected and forwards a full-payload
//!    order_created event as a one-order batch tagged Push.
//! 2. A bare-id event is hydrated through the order source before
//!    forwarding.
//! 3. Malformed and unknown events are skipped without killing the stream.
//! 4. Signalling shutdown terminates the listener promptly, including from
//!    the reconnect-backoff sleep, and leaves the state Disconnected.
//!
//! The server side is an in-process tokio-tungstenite acceptor; no real
//! network beyond the loopback interface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::SinkExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use till_push::{ConnectionState, PushConfig, PushListener, ReconnectBackoff};
use till_remote::{OrderSource, SourceError};
use till_schemas::{OrderBatch, RemoteOrder, SyncChannel};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct FixedSource {
    orders: Vec<RemoteOrder>,
}

#[async_trait]
impl OrderSource for FixedSource {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn fetch_since(&self, _since: DateTime<Utc>) -> Result<Vec<RemoteOrder>, SourceError> {
        Ok(self.orders.clone())
    }

    async fn fetch_by_id(&self, remote_id: &str) -> Result<Option<RemoteOrder>, SourceError> {
        Ok(self.orders.iter().find(|o| o.remote_id == remote_id).cloned())
    }
}

fn sample_order(remote_id: &str) -> RemoteOrder {
    RemoteOrder {
        remote_id: remote_id.to_string(),
        order_number: format!("N-{remote_id}"),
        created_at: Utc.timestamp_opt(10_000, 0).unwrap(),
        customer_name: "Ana".to_string(),
        customer_phone: None,
        total_cents: 450,
        lines: Vec::new(),
    }
}

fn fast_backoff() -> ReconnectBackoff {
    ReconnectBackoff::new(Duration::from_millis(20), Duration::from_millis(100), 0)
}

/// Bind a loopback WebSocket server that accepts one connection, sends the
/// given frames, then closes. Returns the URL to connect to.
async fn one_shot_server(frames: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in frames {
            ws.send(Message::Text(frame)).await.unwrap();
        }
        // Give the client time to consume before the close frame races it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = ws.close(None).await;
    });

    format!("ws://{addr}")
}

fn spawn_listener(
    url: String,
    source: Arc<dyn OrderSource>,
) -> (
    till_push::PushHandle,
    mpsc::Receiver<OrderBatch>,
    watch::Sender<bool>,
) {
    let (batch_tx, batch_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = PushListener::spawn(
        PushConfig {
            url,
            tenant_id: "cafe-42".to_string(),
            api_key: "key-1".to_string(),
            backoff: fast_backoff(),
        },
        source,
        batch_tx,
        shutdown_rx,
    );
    (handle, batch_rx, shutdown_tx)
}

// ---------------------------------------------------------------------------
// 1. Full payload event is forwarded
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_payload_event_becomes_a_push_batch() {
    let frame = r#"{
        "type": "order_created",
        "order": {
            "id": "ord_1",
            "number": "A-1",
            "created_at": "2026-03-02T12:00:00Z",
            "customer_name": "Leo",
            "total": "4.50",
            "items": [{ "name": "Espresso", "quantity": 1, "unit_price": "4.50" }]
        }
    }"#;
    let url = one_shot_server(vec![frame.to_string()]).await;
    let source = Arc::new(FixedSource { orders: vec![] });
    let (handle, mut batch_rx, shutdown_tx) = spawn_listener(url, source);

    let batch = timeout(Duration::from_secs(5), batch_rx.recv())
        .await
        .expect("batch must arrive")
        .expect("channel open");

    assert_eq!(batch.channel, SyncChannel::Push);
    assert_eq!(batch.orders.len(), 1, "push forwards one-order batches");
    assert_eq!(batch.orders[0].remote_id, "ord_1");
    assert!(handle.last_event_at().is_some());

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("listener must stop after shutdown");
}

// ---------------------------------------------------------------------------
// 2. Bare id event is hydrated through the source
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bare_id_event_is_hydrated_before_forwarding() {
    let frame = r#"{ "type": "order_created", "order_id": "ord_7" }"#;
    let url = one_shot_server(vec![frame.to_string()]).await;
    let source = Arc::new(FixedSource {
        orders: vec![sample_order("ord_7")],
    });
    let (handle, mut batch_rx, shutdown_tx) = spawn_listener(url, source);

    let batch = timeout(Duration::from_secs(5), batch_rx.recv())
        .await
        .expect("batch must arrive")
        .expect("channel open");

    assert_eq!(batch.orders[0].remote_id, "ord_7");
    assert_eq!(batch.orders[0].customer_name, "Ana", "hydrated payload");

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(5), handle.join()).await.unwrap();
}

// ---------------------------------------------------------------------------
// 3. Bad events are skipped, stream survives
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_and_unknown_events_are_skipped() {
    let frames = vec![
        "not json".to_string(),
        r#"{ "type": "heartbeat" }"#.to_string(),
        r#"{ "type": "order_created", "order_id": "ord_unknown" }"#.to_string(),
        r#"{
            "type": "order_created",
            "order": {
                "id": "ord_2",
                "number": "A-2",
                "created_at": "2026-03-02T12:05:00Z",
                "customer_name": "Mia",
                "total": "3.00",
                "items": []
            }
        }"#
        .to_string(),
    ];
    let url = one_shot_server(frames).await;
    // Source knows nothing, so the bare-id hydration returns None → skip.
    let source = Arc::new(FixedSource { orders: vec![] });
    let (handle, mut batch_rx, shutdown_tx) = spawn_listener(url, source);

    let batch = timeout(Duration::from_secs(5), batch_rx.recv())
        .await
        .expect("good event must still arrive")
        .expect("channel open");
    assert_eq!(batch.orders[0].remote_id, "ord_2");

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(5), handle.join()).await.unwrap();

    assert!(
        batch_rx.try_recv().is_err(),
        "skipped events must not produce batches"
    );
}

// ---------------------------------------------------------------------------
// 4. Shutdown interrupts the reconnect backoff
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_interrupts_reconnect_loop() {
    // Nothing listens on this port after binding is dropped: every connect
    // attempt fails and the listener sits in backoff.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = Arc::new(FixedSource { orders: vec![] });
    let (handle, _batch_rx, shutdown_tx) = spawn_listener(format!("ws://{addr}"), source);

    // Let it cycle through at least one failed attempt.
    tokio::time::sleep(Duration::from_millis(80)).await;

    shutdown_tx.send(true).unwrap();
    let state_rx = handle.state_receiver();
    timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("listener must stop promptly from backoff sleep");

    assert_eq!(*state_rx.borrow(), ConnectionState::Disconnected);
}
