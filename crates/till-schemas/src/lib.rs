//! Canonical order-sync types shared across the TillSync workspace.
//!
//! Everything that crosses a crate boundary lives here: the canonical order
//! shape, sync status / channel enums as stored in the database, the batch
//! envelope both delivery channels emit, and the per-tenant checkpoint.
//!
//! Money is carried as integer cents. Decimal strings from the wire are
//! converted at the boundary via [`amount_to_cents`]; no floats anywhere.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// One line item on a remote order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub name: String,
    pub quantity: i64,
    /// Unit price in integer cents.
    pub unit_price_cents: i64,
    /// Free-text preparation instructions, if the customer left any.
    pub instructions: Option<String>,
}

/// Canonical unit of synchronization: one order as known at the remote
/// ordering platform.
///
/// `remote_id` is the only deduplication key. The storage-assigned local id
/// is deliberately absent from this type so nothing upstream of the store
/// can key on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOrder {
    /// Stable, globally unique id assigned by the remote platform.
    pub remote_id: String,
    /// Display number shown to staff; not unique across time.
    pub order_number: String,
    /// Creation timestamp on the remote platform's clock. Drives fetch
    /// windows and checkpoint advancement.
    pub created_at: DateTime<Utc>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    /// Order total in integer cents.
    pub total_cents: i64,
    pub lines: Vec<OrderLine>,
}

impl RemoteOrder {
    /// Sum of `quantity * unit_price_cents` across all lines.
    ///
    /// Diagnostic only: the remote platform's `total_cents` is authoritative
    /// (it may include fees or discounts not represented per line).
    pub fn line_total_cents(&self) -> i64 {
        self.lines
            .iter()
            .map(|l| l.quantity.saturating_mul(l.unit_price_cents))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Sync status / channel
// ---------------------------------------------------------------------------

/// Per-order durability state as stored in the `orders` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Known locally but not yet confirmed written.
    Pending,
    /// Header and full line list durably persisted in one transaction.
    Synced,
    /// A write attempt errored; the next poll window retries it.
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(SyncStatus::Pending),
            "SYNCED" => Ok(SyncStatus::Synced),
            "FAILED" => Ok(SyncStatus::Failed),
            other => Err(anyhow!("invalid sync status: {}", other)),
        }
    }
}

/// Which delivery channel produced a batch or a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncChannel {
    /// Persistent WebSocket stream (near-real-time).
    Push,
    /// Periodic time-windowed fetch (backup + gap recovery).
    Poll,
}

impl SyncChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncChannel::Push => "PUSH",
            SyncChannel::Poll => "POLL",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PUSH" => Ok(SyncChannel::Push),
            "POLL" => Ok(SyncChannel::Poll),
            other => Err(anyhow!("invalid sync channel: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Batch envelope
// ---------------------------------------------------------------------------

/// A set of candidate orders from one channel, ready for reconciliation.
///
/// Orders are sorted ascending by `created_at` at construction so the
/// reconciler can rely on batch order matching checkpoint order.
#[derive(Debug, Clone)]
pub struct OrderBatch {
    pub channel: SyncChannel,
    pub orders: Vec<RemoteOrder>,
    pub received_at: DateTime<Utc>,
}

impl OrderBatch {
    pub fn new(channel: SyncChannel, mut orders: Vec<RemoteOrder>) -> Self {
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Self {
            channel,
            orders,
            received_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Process-wide sync checkpoint, one row per configured tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub tenant_id: String,
    /// Latest `created_at` among all orders confirmed Synced. Monotonic:
    /// only ever advanced, never rewound.
    pub last_synced_at: DateTime<Utc>,
    /// Channel that produced the most recent successful sync. Diagnostics
    /// only; never consulted for correctness.
    pub last_channel: SyncChannel,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Money parsing
// ---------------------------------------------------------------------------

/// Convert a decimal amount string (e.g. `"12.50"`) to integer cents
/// deterministically.
///
/// Rules:
/// - Accepts optional leading `+` or `-`.
/// - Accepts an optional fractional part separated by `.`.
/// - Rejects more than 2 decimal places (would require rounding).
/// - Rejects empty strings, non-numeric characters, or multiple `.`.
/// - Does **not** use floating-point at any stage.
pub fn amount_to_cents(s: &str, field: &'static str) -> Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("empty amount for field '{}'", field));
    }

    let (negative, digits) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(anyhow!("invalid amount '{}' for field '{}'", s, field));
    }
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(anyhow!("invalid amount '{}' for field '{}'", s, field));
    }
    if frac_part.len() > 2 {
        return Err(anyhow!(
            "amount '{}' for field '{}' has more than 2 decimal places",
            s,
            field
        ));
    }

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse::<i64>()
            .map_err(|_| anyhow!("invalid amount '{}' for field '{}'", s, field))?
    };

    let mut frac_padded = frac_part.to_string();
    while frac_padded.len() < 2 {
        frac_padded.push('0');
    }
    let frac_val: i64 = frac_padded
        .parse::<i64>()
        .map_err(|_| anyhow!("invalid amount '{}' for field '{}'", s, field))?;

    let cents = int_val
        .checked_mul(100)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(|| anyhow!("amount '{}' for field '{}' overflows", s, field))?;

    Ok(if negative { -cents } else { cents })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order_at(remote_id: &str, ts: i64) -> RemoteOrder {
        RemoteOrder {
            remote_id: remote_id.to_string(),
            order_number: "A-1".to_string(),
            created_at: Utc.timestamp_opt(ts, 0).unwrap(),
            customer_name: "Jamie".to_string(),
            customer_phone: None,
            total_cents: 1250,
            lines: vec![OrderLine {
                name: "Flat White".to_string(),
                quantity: 2,
                unit_price_cents: 625,
                instructions: None,
            }],
        }
    }

    #[test]
    fn batch_sorts_orders_ascending_by_created_at() {
        let batch = OrderBatch::new(
            SyncChannel::Poll,
            vec![order_at("r3", 300), order_at("r1", 100), order_at("r2", 200)],
        );
        let ids: Vec<&str> = batch.orders.iter().map(|o| o.remote_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn sync_status_round_trips_through_strings() {
        for st in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Failed] {
            assert_eq!(SyncStatus::parse(st.as_str()).unwrap(), st);
        }
        assert!(SyncStatus::parse("DONE").is_err());
    }

    #[test]
    fn sync_channel_round_trips_through_strings() {
        for ch in [SyncChannel::Push, SyncChannel::Poll] {
            assert_eq!(SyncChannel::parse(ch.as_str()).unwrap(), ch);
        }
        assert!(SyncChannel::parse("WEBHOOK").is_err());
    }

    #[test]
    fn line_total_sums_quantity_times_unit_price() {
        let o = order_at("r1", 100);
        assert_eq!(o.line_total_cents(), 1250);
    }

    #[test]
    fn amount_to_cents_whole_and_fractional() {
        assert_eq!(amount_to_cents("12.50", "total").unwrap(), 1250);
        assert_eq!(amount_to_cents("12", "total").unwrap(), 1200);
        assert_eq!(amount_to_cents("0.05", "total").unwrap(), 5);
        assert_eq!(amount_to_cents(".99", "total").unwrap(), 99);
        assert_eq!(amount_to_cents("7.5", "total").unwrap(), 750);
    }

    #[test]
    fn amount_to_cents_sign_handling() {
        assert_eq!(amount_to_cents("-3.25", "total").unwrap(), -325);
        assert_eq!(amount_to_cents("+3.25", "total").unwrap(), 325);
    }

    #[test]
    fn amount_to_cents_rejects_garbage() {
        assert!(amount_to_cents("", "total").is_err());
        assert!(amount_to_cents("12.345", "total").is_err());
        assert!(amount_to_cents("12.3.4", "total").is_err());
        assert!(amount_to_cents("abc", "total").is_err());
        assert!(amount_to_cents("12,50", "total").is_err());
        assert!(amount_to_cents("-", "total").is_err());
    }
}
