//! Wire DTOs for the platform's JSON order payloads.
//!
//! Money arrives as decimal strings and is converted to integer cents at
//! this boundary; nothing downstream sees a float. A single malformed
//! order inside an otherwise valid listing is the caller's problem to skip
//! — this module only reports the decode failure.

use serde::Deserialize;
use serde_json::Value;

use till_schemas::{amount_to_cents, OrderLine, RemoteOrder};

use crate::source::SourceError;

#[derive(Debug, Deserialize)]
pub(crate) struct WireLine {
    pub name: String,
    pub quantity: i64,
    /// Decimal string, e.g. `"6.25"`.
    pub unit_price: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireOrder {
    pub id: String,
    pub number: String,
    /// RFC 3339 timestamp.
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    /// Decimal string, e.g. `"18.50"`.
    pub total: String,
    #[serde(default)]
    pub items: Vec<WireLine>,
}

/// Listing envelope returned by `GET /v1/orders`.
///
/// Orders are kept as raw values so one malformed element can be skipped
/// without rejecting the whole page.
#[derive(Debug, Deserialize)]
pub(crate) struct WireOrderPage {
    pub orders: Vec<Value>,
}

/// Decode one raw order value into the canonical shape.
pub fn parse_wire_order(raw: &Value) -> Result<RemoteOrder, SourceError> {
    let wire: WireOrder = serde_json::from_value(raw.clone())
        .map_err(|e| SourceError::Decode(format!("order payload: {e}")))?;
    wire_to_canonical(wire)
}

pub(crate) fn wire_to_canonical(wire: WireOrder) -> Result<RemoteOrder, SourceError> {
    if wire.id.trim().is_empty() {
        return Err(SourceError::Decode("order payload: empty id".to_string()));
    }

    let total_cents = amount_to_cents(&wire.total, "total")
        .map_err(|e| SourceError::Decode(e.to_string()))?;

    let mut lines = Vec::with_capacity(wire.items.len());
    for item in wire.items {
        let unit_price_cents = amount_to_cents(&item.unit_price, "unit_price")
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        lines.push(OrderLine {
            name: item.name,
            quantity: item.quantity,
            unit_price_cents,
            instructions: item.instructions,
        });
    }

    Ok(RemoteOrder {
        remote_id: wire.id,
        order_number: wire.number,
        created_at: wire.created_at,
        customer_name: wire.customer_name,
        customer_phone: wire.customer_phone,
        total_cents,
        lines,
    })
}
