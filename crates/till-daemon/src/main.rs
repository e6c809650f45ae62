//! till-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads config,
//! opens the store, starts the sync engine, wires middleware, and serves
//! HTTP until ctrl-c. Route handlers live in `routes.rs`; shared state in
//! `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use till_daemon::{routes, state};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

const ENV_BIND_ADDR: &str = "TILL_DAEMON_ADDR";
/// Comma-separated YAML paths in merge order (base first).
const ENV_CONFIG_PATHS: &str = "TILL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/base.yaml";
const DEFAULT_DB_URL: &str = "sqlite://till-orders.db";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file
    // does not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config_paths = std::env::var(ENV_CONFIG_PATHS)
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let paths: Vec<&str> = config_paths.split(',').map(str::trim).collect();
    let loaded = till_config::load_layered_yaml(&paths).context("config load failed")?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let settings = till_config::SyncSettings::from_config(&loaded.config_json)?;
    let credentials = till_config::resolve_credentials(&loaded.config_json)?;

    let db_url =
        std::env::var(till_db::ENV_DB_URL).unwrap_or_else(|_| DEFAULT_DB_URL.to_string());
    let pool = till_db::connect(&db_url).await?;
    till_db::migrate(&pool).await?;

    let engine = till_sync::SyncEngine::start(pool.clone(), settings, credentials).await?;

    let shared = Arc::new(state::AppState::new(
        engine.events_sender(),
        engine.health().clone(),
        pool,
    ));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787)));
    info!("till-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    // HTTP is down; drain the engine so accepted batches finish writing.
    engine.shutdown().await?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(ENV_BIND_ADDR).ok()?.parse().ok()
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// CORS: allow only localhost origins (the till's own UI).
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
        .allow_headers(tower_http::cors::Any)
}
