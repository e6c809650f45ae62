//! JSON response shapes for the daemon's HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use till_db::StoredOrder;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Order header as listed by GET /v1/orders/recent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderSummary {
    pub remote_id: String,
    pub order_number: String,
    pub created_at: DateTime<Utc>,
    pub customer_name: String,
    pub total_cents: i64,
    /// "PENDING" | "SYNCED" | "FAILED"
    pub sync_status: String,
    pub synced_at: Option<DateTime<Utc>>,
}

impl From<StoredOrder> for OrderSummary {
    fn from(o: StoredOrder) -> Self {
        Self {
            remote_id: o.remote_id,
            order_number: o.order_number,
            created_at: o.created_at,
            customer_name: o.customer_name,
            total_cents: o.total_cents,
            sync_status: o.sync_status.as_str().to_string(),
            synced_at: o.synced_at,
        }
    }
}
