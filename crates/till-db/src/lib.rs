//! Local order store for TillSync (SQLite via sqlx).
//!
//! This crate is the only place that speaks SQL. The write surface is
//! deliberately narrow — idempotent upsert keyed by `remote_id`, failure
//! marking, checkpoint advance — and is consumed exclusively by the sync
//! reconciler. Read-only queries (counts, listings) serve the health
//! monitor and the daemon.
//!
//! Timestamps are stored as integer UTC epoch milliseconds so ordering and
//! comparisons in SQL are deterministic.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use till_schemas::{OrderLine, RemoteOrder, SyncChannel, SyncCheckpoint, SyncStatus};

pub const ENV_DB_URL: &str = "TILL_DATABASE_URL";

// ---------------------------------------------------------------------------
// Connection / migration
// ---------------------------------------------------------------------------

/// Connect to SQLite using TILL_DATABASE_URL.
pub async fn connect_from_env() -> Result<SqlitePool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

/// Connect to SQLite at `url` (e.g. `sqlite:///var/lib/till/orders.db` or
/// `sqlite::memory:` in tests), creating the file if needed.
///
/// The pool is capped at one connection: SQLite admits a single writer, and
/// a one-connection pool also keeps `sqlite::memory:` databases coherent in
/// tests (each new connection to `:memory:` would otherwise be a fresh DB).
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid sqlite url: {url}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .context("failed to connect to SQLite")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &SqlitePool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (i32,) = sqlx::query_as::<_, (i32,)>(
        r#"
        select exists (
            select 1 from sqlite_master
            where type = 'table' and name = 'orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_orders_table: exists == 1,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

// ---------------------------------------------------------------------------
// Upsert
// ---------------------------------------------------------------------------

/// Result of one idempotent order write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for this `remote_id`; header + lines were written and
    /// the row was flipped to Synced, all in one transaction.
    Inserted { local_id: i64 },
    /// A Pending/Failed row existed (an earlier write attempt did not reach
    /// Synced); its lines were rewritten and the row flipped to Synced.
    /// The original `local_id` is kept.
    Retried { local_id: i64 },
    /// A Synced row already existed — silent no-op. The first observing
    /// channel wins; a later duplicate never overwrites.
    AlreadyPresent,
}

impl UpsertOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted { .. })
    }
}

/// Return whether an order row exists for `remote_id` (any status).
pub async fn order_exists(pool: &SqlitePool, remote_id: &str) -> Result<bool> {
    let (n,): (i64,) =
        sqlx::query_as::<_, (i64,)>("select count(*) from orders where remote_id = ?1")
            .bind(remote_id)
            .fetch_one(pool)
            .await
            .context("order_exists query failed")?;
    Ok(n > 0)
}

/// Idempotently persist one order as Synced.
///
/// Header and full line list are written in a single transaction, so no
/// observer ever sees a Synced row with a partial line list. A row already
/// Synced is left untouched; a Pending/Failed leftover is completed in
/// place (same `local_id`).
pub async fn upsert_order_synced(pool: &SqlitePool, order: &RemoteOrder) -> Result<UpsertOutcome> {
    let mut tx = pool.begin().await.context("upsert begin failed")?;

    let existing = sqlx::query("select local_id, sync_status from orders where remote_id = ?1")
        .bind(&order.remote_id)
        .fetch_optional(&mut *tx)
        .await
        .context("upsert existence check failed")?;

    let outcome = match existing {
        None => {
            let local_id = insert_header_pending(&mut tx, order).await?;
            insert_lines(&mut tx, local_id, &order.lines).await?;
            flip_synced(&mut tx, local_id).await?;
            UpsertOutcome::Inserted { local_id }
        }
        Some(row) => {
            let local_id: i64 = row.try_get("local_id")?;
            let status = SyncStatus::parse(&row.try_get::<String, _>("sync_status")?)?;
            match status {
                SyncStatus::Synced => UpsertOutcome::AlreadyPresent,
                SyncStatus::Pending | SyncStatus::Failed => {
                    // Earlier attempt never reached Synced; rewrite the
                    // lines and complete it under the same local_id.
                    sqlx::query("delete from order_lines where order_local_id = ?1")
                        .bind(local_id)
                        .execute(&mut *tx)
                        .await
                        .context("upsert stale-line delete failed")?;
                    update_header(&mut tx, local_id, order).await?;
                    insert_lines(&mut tx, local_id, &order.lines).await?;
                    flip_synced(&mut tx, local_id).await?;
                    UpsertOutcome::Retried { local_id }
                }
            }
        }
    };

    tx.commit().await.context("upsert commit failed")?;
    Ok(outcome)
}

async fn insert_header_pending(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    order: &RemoteOrder,
) -> Result<i64> {
    let res = sqlx::query(
        r#"
        insert into orders (
          remote_id, order_number, created_at_ms, customer_name,
          customer_phone, total_cents, sync_status
        ) values (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING')
        "#,
    )
    .bind(&order.remote_id)
    .bind(&order.order_number)
    .bind(order.created_at.timestamp_millis())
    .bind(&order.customer_name)
    .bind(&order.customer_phone)
    .bind(order.total_cents)
    .execute(&mut **tx)
    .await
    .context("order header insert failed")?;

    Ok(res.last_insert_rowid())
}

async fn update_header(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    local_id: i64,
    order: &RemoteOrder,
) -> Result<()> {
    sqlx::query(
        r#"
        update orders set
          order_number = ?2,
          created_at_ms = ?3,
          customer_name = ?4,
          customer_phone = ?5,
          total_cents = ?6,
          failure_reason = null
        where local_id = ?1
        "#,
    )
    .bind(local_id)
    .bind(&order.order_number)
    .bind(order.created_at.timestamp_millis())
    .bind(&order.customer_name)
    .bind(&order.customer_phone)
    .bind(order.total_cents)
    .execute(&mut **tx)
    .await
    .context("order header update failed")?;
    Ok(())
}

async fn insert_lines(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    local_id: i64,
    lines: &[OrderLine],
) -> Result<()> {
    for line in lines {
        sqlx::query(
            r#"
            insert into order_lines (
              order_local_id, name, quantity, unit_price_cents, instructions
            ) values (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(local_id)
        .bind(&line.name)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .bind(&line.instructions)
        .execute(&mut **tx)
        .await
        .context("order line insert failed")?;
    }
    Ok(())
}

async fn flip_synced(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, local_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        update orders set
          sync_status = 'SYNCED',
          synced_at_ms = ?2,
          failure_reason = null
        where local_id = ?1
        "#,
    )
    .bind(local_id)
    .bind(Utc::now().timestamp_millis())
    .execute(&mut **tx)
    .await
    .context("synced flip failed")?;
    Ok(())
}

/// Record a persistence failure for `remote_id` so health counts surface it
/// and the next poll window retries it.
///
/// Inserts a header-only Failed row when the order was never persisted;
/// otherwise flips the existing row to Failed — unless it is already
/// Synced, which is never downgraded.
pub async fn mark_order_failed(
    pool: &SqlitePool,
    order: &RemoteOrder,
    reason: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into orders (
          remote_id, order_number, created_at_ms, customer_name,
          customer_phone, total_cents, sync_status, failure_reason
        ) values (?1, ?2, ?3, ?4, ?5, ?6, 'FAILED', ?7)
        on conflict (remote_id) do update set
          sync_status = 'FAILED',
          failure_reason = excluded.failure_reason
        where orders.sync_status != 'SYNCED'
        "#,
    )
    .bind(&order.remote_id)
    .bind(&order.order_number)
    .bind(order.created_at.timestamp_millis())
    .bind(&order.customer_name)
    .bind(&order.customer_phone)
    .bind(order.total_cents)
    .bind(reason)
    .execute(pool)
    .await
    .context("mark_order_failed failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

pub async fn checkpoint_get(pool: &SqlitePool, tenant_id: &str) -> Result<Option<SyncCheckpoint>> {
    let row = sqlx::query(
        r#"
        select tenant_id, last_synced_at_ms, last_channel, updated_at_ms
        from sync_checkpoint
        where tenant_id = ?1
        "#,
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await
    .context("checkpoint_get failed")?;

    match row {
        None => Ok(None),
        Some(r) => Ok(Some(SyncCheckpoint {
            tenant_id: r.try_get("tenant_id")?,
            last_synced_at: ms_to_utc(r.try_get::<i64, _>("last_synced_at_ms")?)?,
            last_channel: SyncChannel::parse(&r.try_get::<String, _>("last_channel")?)?,
            updated_at: ms_to_utc(r.try_get::<i64, _>("updated_at_ms")?)?,
        })),
    }
}

/// Advance the checkpoint to `last_synced_at` if and only if it is newer
/// than the stored value. Returns `true` when the checkpoint moved.
///
/// The predicate makes the monotonic invariant hold even if a second
/// process shares the same DB file; the engine's in-process watermark is
/// the cheap first line of defense.
pub async fn checkpoint_advance(
    pool: &SqlitePool,
    tenant_id: &str,
    last_synced_at: DateTime<Utc>,
    channel: SyncChannel,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        insert into sync_checkpoint (tenant_id, last_synced_at_ms, last_channel, updated_at_ms)
        values (?1, ?2, ?3, ?4)
        on conflict (tenant_id) do update set
          last_synced_at_ms = excluded.last_synced_at_ms,
          last_channel = excluded.last_channel,
          updated_at_ms = excluded.updated_at_ms
        where excluded.last_synced_at_ms > sync_checkpoint.last_synced_at_ms
        "#,
    )
    .bind(tenant_id)
    .bind(last_synced_at.timestamp_millis())
    .bind(channel.as_str())
    .bind(Utc::now().timestamp_millis())
    .execute(pool)
    .await
    .context("checkpoint_advance failed")?;

    Ok(res.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Read-only queries
// ---------------------------------------------------------------------------

pub async fn count_by_status(pool: &SqlitePool, status: SyncStatus) -> Result<i64> {
    let (n,): (i64,) =
        sqlx::query_as::<_, (i64,)>("select count(*) from orders where sync_status = ?1")
            .bind(status.as_str())
            .fetch_one(pool)
            .await
            .context("count_by_status failed")?;
    Ok(n)
}

/// A stored order header as read back from the `orders` table.
#[derive(Debug, Clone)]
pub struct StoredOrder {
    pub local_id: i64,
    pub remote_id: String,
    pub order_number: String,
    pub created_at: DateTime<Utc>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub total_cents: i64,
    pub sync_status: SyncStatus,
    pub synced_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub lines: Vec<OrderLine>,
}

/// Fetch one order (header + lines) by remote id.
pub async fn fetch_order(pool: &SqlitePool, remote_id: &str) -> Result<Option<StoredOrder>> {
    let row = sqlx::query(
        r#"
        select local_id, remote_id, order_number, created_at_ms, customer_name,
               customer_phone, total_cents, sync_status, synced_at_ms, failure_reason
        from orders
        where remote_id = ?1
        "#,
    )
    .bind(remote_id)
    .fetch_optional(pool)
    .await
    .context("fetch_order header query failed")?;

    let Some(r) = row else {
        return Ok(None);
    };

    let local_id: i64 = r.try_get("local_id")?;
    let lines = fetch_lines(pool, local_id).await?;

    Ok(Some(StoredOrder {
        local_id,
        remote_id: r.try_get("remote_id")?,
        order_number: r.try_get("order_number")?,
        created_at: ms_to_utc(r.try_get::<i64, _>("created_at_ms")?)?,
        customer_name: r.try_get("customer_name")?,
        customer_phone: r.try_get("customer_phone")?,
        total_cents: r.try_get("total_cents")?,
        sync_status: SyncStatus::parse(&r.try_get::<String, _>("sync_status")?)?,
        synced_at: match r.try_get::<Option<i64>, _>("synced_at_ms")? {
            Some(ms) => Some(ms_to_utc(ms)?),
            None => None,
        },
        failure_reason: r.try_get("failure_reason")?,
        lines,
    }))
}

async fn fetch_lines(pool: &SqlitePool, local_id: i64) -> Result<Vec<OrderLine>> {
    let rows = sqlx::query(
        r#"
        select name, quantity, unit_price_cents, instructions
        from order_lines
        where order_local_id = ?1
        order by line_id asc
        "#,
    )
    .bind(local_id)
    .fetch_all(pool)
    .await
    .context("fetch_order lines query failed")?;

    let mut lines = Vec::with_capacity(rows.len());
    for r in rows {
        lines.push(OrderLine {
            name: r.try_get("name")?,
            quantity: r.try_get("quantity")?,
            unit_price_cents: r.try_get("unit_price_cents")?,
            instructions: r.try_get("instructions")?,
        });
    }
    Ok(lines)
}

/// Most recently created orders (headers only), newest first.
pub async fn recent_orders(pool: &SqlitePool, limit: i64) -> Result<Vec<StoredOrder>> {
    let rows = sqlx::query(
        r#"
        select local_id, remote_id, order_number, created_at_ms, customer_name,
               customer_phone, total_cents, sync_status, synced_at_ms, failure_reason
        from orders
        order by created_at_ms desc, local_id desc
        limit ?1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("recent_orders query failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        out.push(StoredOrder {
            local_id: r.try_get("local_id")?,
            remote_id: r.try_get("remote_id")?,
            order_number: r.try_get("order_number")?,
            created_at: ms_to_utc(r.try_get::<i64, _>("created_at_ms")?)?,
            customer_name: r.try_get("customer_name")?,
            customer_phone: r.try_get("customer_phone")?,
            total_cents: r.try_get("total_cents")?,
            sync_status: SyncStatus::parse(&r.try_get::<String, _>("sync_status")?)?,
            synced_at: match r.try_get::<Option<i64>, _>("synced_at_ms")? {
                Some(ms) => Some(ms_to_utc(ms)?),
                None => None,
            },
            failure_reason: r.try_get("failure_reason")?,
            lines: Vec::new(),
        });
    }
    Ok(out)
}

fn ms_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow!("invalid epoch millis in store: {}", ms))
}
