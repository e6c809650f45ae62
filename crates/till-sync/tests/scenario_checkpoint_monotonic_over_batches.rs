//! Scenario: out-of-order batches never rewind the checkpoint.
//!
//! # Invariants under test
//!
//! 1. A batch with older timestamps than the current checkpoint still
//!    persists its orders (they are new remote ids) but does not move the
//!    checkpoint backward.
//! 2. last_channel reflects the batch that last advanced the checkpoint,
//!    not the last batch processed.
//! 3. Re-feeding overlapping windows (idempotent re-fetch) leaves the
//!    final store state identical to a single feed.

use chrono::{TimeZone, Utc};
use tokio::sync::{broadcast, mpsc};

use till_schemas::{OrderBatch, RemoteOrder, SyncChannel};
use till_sync::{CheckpointWatermark, HealthMonitor, Reconciler, SyncEvent};

fn order(remote_id: &str, ts: i64) -> RemoteOrder {
    RemoteOrder {
        remote_id: remote_id.to_string(),
        order_number: format!("N-{remote_id}"),
        created_at: Utc.timestamp_opt(ts, 0).unwrap(),
        customer_name: "Kim".to_string(),
        customer_phone: None,
        total_cents: 400,
        lines: Vec::new(),
    }
}

async fn feed(pool: &sqlx::SqlitePool, batches: Vec<OrderBatch>) -> Vec<SyncEvent> {
    let (batch_tx, batch_rx) = mpsc::channel(16);
    let (events, mut events_rx) = broadcast::channel(256);
    let health = HealthMonitor::new(pool.clone(), "cafe-42", None);

    // Seed the watermark from the stored checkpoint the way the engine
    // does at startup.
    let seeded = till_db::checkpoint_get(pool, "cafe-42")
        .await
        .unwrap()
        .map(|c| c.last_synced_at);

    let reconciler = Reconciler::new(
        pool.clone(),
        "cafe-42",
        batch_rx,
        events,
        health,
        CheckpointWatermark::seeded(seeded),
    );

    for batch in batches {
        batch_tx.send(batch).await.unwrap();
    }
    drop(batch_tx);
    reconciler.run().await;

    let mut seen = Vec::new();
    while let Ok(ev) = events_rx.try_recv() {
        seen.push(ev);
    }
    seen
}

#[tokio::test]
async fn late_batch_with_older_timestamps_does_not_rewind() {
    let pool = till_db::connect("sqlite::memory:").await.unwrap();
    till_db::migrate(&pool).await.unwrap();

    // Push delivers a recent order first.
    feed(
        &pool,
        vec![OrderBatch::new(SyncChannel::Push, vec![order("r2", 20_000)])],
    )
    .await;

    // A poll recovery batch then arrives carrying an older missed order.
    feed(
        &pool,
        vec![OrderBatch::new(SyncChannel::Poll, vec![order("r1", 10_000)])],
    )
    .await;

    // The older order is stored…
    assert!(till_db::fetch_order(&pool, "r1").await.unwrap().is_some());

    // …but the checkpoint stays at the newer timestamp and channel.
    let cp = till_db::checkpoint_get(&pool, "cafe-42")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cp.last_synced_at, Utc.timestamp_opt(20_000, 0).unwrap());
    assert_eq!(cp.last_channel, SyncChannel::Push);
}

#[tokio::test]
async fn checkpoint_is_nondecreasing_across_shuffled_batches() {
    let pool = till_db::connect("sqlite::memory:").await.unwrap();
    till_db::migrate(&pool).await.unwrap();

    let sequences = vec![
        vec![order("a", 5_000), order("b", 7_000)],
        vec![order("c", 6_000)],
        vec![order("d", 3_000)],
        vec![order("e", 9_000)],
    ];

    let mut highwater = 0i64;
    for orders in sequences {
        let batch_max = orders
            .iter()
            .map(|o| o.created_at.timestamp())
            .max()
            .unwrap();
        feed(&pool, vec![OrderBatch::new(SyncChannel::Poll, orders)]).await;

        highwater = highwater.max(batch_max);
        let cp = till_db::checkpoint_get(&pool, "cafe-42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            cp.last_synced_at.timestamp(),
            highwater,
            "checkpoint must track the running maximum"
        );
    }
}

#[tokio::test]
async fn overlapping_refetch_is_equivalent_to_single_feed() {
    let pool_once = till_db::connect("sqlite::memory:").await.unwrap();
    till_db::migrate(&pool_once).await.unwrap();
    let pool_twice = till_db::connect("sqlite::memory:").await.unwrap();
    till_db::migrate(&pool_twice).await.unwrap();

    let window = vec![order("r1", 1_000), order("r2", 2_000), order("r3", 3_000)];

    feed(
        &pool_once,
        vec![OrderBatch::new(SyncChannel::Poll, window.clone())],
    )
    .await;
    feed(
        &pool_twice,
        vec![
            OrderBatch::new(SyncChannel::Poll, window.clone()),
            OrderBatch::new(SyncChannel::Poll, window.clone()),
        ],
    )
    .await;

    for pool in [&pool_once, &pool_twice] {
        let (count,): (i64,) = sqlx::query_as("select count(*) from orders")
            .fetch_one(pool)
            .await
            .unwrap();
        assert_eq!(count, 3);

        let cp = till_db::checkpoint_get(pool, "cafe-42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cp.last_synced_at, Utc.timestamp_opt(3_000, 0).unwrap());
    }
}
