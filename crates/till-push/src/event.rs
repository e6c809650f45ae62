//! Push event decoding.
//!
//! The platform delivers discrete JSON events over the stream. An
//! `order_created` event carries either the full order payload or a bare
//! remote id (the listener hydrates the latter through the order source
//! before forwarding).

use serde_json::Value;

use till_remote::{parse_wire_order, SourceError};
use till_schemas::RemoteOrder;

/// One decoded stream event.
#[derive(Debug)]
pub enum PushEvent {
    /// `order_created` with a full payload.
    OrderCreated(Box<RemoteOrder>),
    /// `order_created` carrying only a remote id; needs hydration.
    OrderCreatedId(String),
    /// An event type this engine does not consume (heartbeats, acks, …).
    Ignored,
}

/// Decode one text frame into a [`PushEvent`].
///
/// Unknown event types are `Ignored`, not errors: the stream carries more
/// than this engine consumes. A malformed `order_created` payload is a
/// decode error — the caller logs and skips that single event.
pub fn decode_event(text: &str) -> Result<PushEvent, SourceError> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| SourceError::Decode(format!("stream frame: {e}")))?;

    let event_type = raw.get("type").and_then(Value::as_str).unwrap_or_default();
    if event_type != "order_created" {
        return Ok(PushEvent::Ignored);
    }

    if let Some(order_raw) = raw.get("order") {
        let order = parse_wire_order(order_raw)?;
        return Ok(PushEvent::OrderCreated(Box::new(order)));
    }

    if let Some(id) = raw.get("order_id").and_then(Value::as_str) {
        if id.trim().is_empty() {
            return Err(SourceError::Decode(
                "order_created event: empty order_id".to_string(),
            ));
        }
        return Ok(PushEvent::OrderCreatedId(id.to_string()));
    }

    Err(SourceError::Decode(
        "order_created event: neither order nor order_id present".to_string(),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_payload_event_decodes_to_order() {
        let text = r#"{
            "type": "order_created",
            "order": {
                "id": "ord_5",
                "number": "A-5",
                "created_at": "2026-03-02T12:00:00Z",
                "customer_name": "Leo",
                "total": "4.50",
                "items": [{ "name": "Espresso", "quantity": 1, "unit_price": "4.50" }]
            }
        }"#;

        match decode_event(text).unwrap() {
            PushEvent::OrderCreated(order) => {
                assert_eq!(order.remote_id, "ord_5");
                assert_eq!(order.total_cents, 450);
            }
            other => panic!("expected OrderCreated, got {other:?}"),
        }
    }

    #[test]
    fn bare_id_event_decodes_to_id() {
        let text = r#"{ "type": "order_created", "order_id": "ord_6" }"#;
        match decode_event(text).unwrap() {
            PushEvent::OrderCreatedId(id) => assert_eq!(id, "ord_6"),
            other => panic!("expected OrderCreatedId, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        assert!(matches!(
            decode_event(r#"{ "type": "heartbeat", "ts": 1 }"#).unwrap(),
            PushEvent::Ignored
        ));
    }

    #[test]
    fn malformed_frames_are_decode_errors() {
        assert!(decode_event("not json").is_err());
        assert!(decode_event(r#"{ "type": "order_created" }"#).is_err());
        assert!(decode_event(r#"{ "type": "order_created", "order_id": " " }"#).is_err());
    }
}
