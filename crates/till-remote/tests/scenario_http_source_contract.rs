//! Scenario: HTTP order source honors the query contract.
//!
//! # Invariants under test
//!
//! 1. fetch_since sends tenant auth headers and the RFC 3339 `since` param.
//! 2. Listings come back ascending by created_at even if the platform
//!    returns them shuffled.
//! 3. A malformed order in a listing is skipped; the rest of the page
//!    survives.
//! 4. Non-2xx responses surface as retryable Api errors.
//! 5. fetch_by_id returns None on 404 and the hydrated order on 200.
//!
//! Uses an in-process mock HTTP server; no real network.

use chrono::{TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::json;
use till_remote::{HttpOrderSource, OrderSource};

fn source_for(server: &MockServer) -> HttpOrderSource {
    HttpOrderSource::new(server.base_url(), "cafe-42", "key-1", "secret-1").unwrap()
}

fn wire_order(id: &str, created_at: &str) -> serde_json::Value {
    json!({
        "id": id,
        "number": format!("N-{id}"),
        "created_at": created_at,
        "customer_name": "Ana",
        "total": "9.00",
        "items": [
            { "name": "Soup", "quantity": 1, "unit_price": "9.00" }
        ]
    })
}

#[tokio::test]
async fn fetch_since_sends_auth_and_window_param() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/orders")
                .query_param("since", "2026-03-02T00:00:00Z")
                .header("X-Tenant-Id", "cafe-42")
                .header("X-Api-Key", "key-1")
                .header("X-Api-Secret", "secret-1");
            then.status(200).json_body(json!({ "orders": [] }));
        })
        .await;

    let source = source_for(&server);
    let since = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();
    let orders = source.fetch_since(since).await.unwrap();

    mock.assert_async().await;
    assert!(orders.is_empty());
}

#[tokio::test]
async fn listing_is_sorted_ascending_by_created_at() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/orders");
            then.status(200).json_body(json!({
                "orders": [
                    wire_order("r2", "2026-03-02T11:30:00Z"),
                    wire_order("r1", "2026-03-02T10:00:00Z"),
                ]
            }));
        })
        .await;

    let source = source_for(&server);
    let orders = source
        .fetch_since(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap())
        .await
        .unwrap();

    let ids: Vec<&str> = orders.iter().map(|o| o.remote_id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2"]);
    assert_eq!(orders[0].total_cents, 900);
}

#[tokio::test]
async fn malformed_order_is_skipped_not_fatal() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/orders");
            then.status(200).json_body(json!({
                "orders": [
                    wire_order("r1", "2026-03-02T10:00:00Z"),
                    { "id": "r-broken", "total": "not-money" },
                    wire_order("r2", "2026-03-02T11:00:00Z"),
                ]
            }));
        })
        .await;

    let source = source_for(&server);
    let orders = source
        .fetch_since(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap())
        .await
        .unwrap();

    let ids: Vec<&str> = orders.iter().map(|o| o.remote_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["r1", "r2"],
        "the broken element must be dropped, the page kept"
    );
}

#[tokio::test]
async fn server_error_is_a_retryable_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/orders");
            then.status(503).body("maintenance");
        })
        .await;

    let source = source_for(&server);
    let err = source
        .fetch_since(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn fetch_by_id_handles_found_and_missing() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/orders/ord_9");
            then.status(200)
                .json_body(wire_order("ord_9", "2026-03-02T12:00:00Z"));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/orders/ord_missing");
            then.status(404);
        })
        .await;

    let source = source_for(&server);

    let found = source.fetch_by_id("ord_9").await.unwrap();
    assert_eq!(found.unwrap().remote_id, "ord_9");

    let missing = source.fetch_by_id("ord_missing").await.unwrap();
    assert!(missing.is_none());
}
