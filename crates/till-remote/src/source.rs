//! Order source boundary.
//!
//! This module defines **only** the source trait and its error taxonomy.
//! No HTTP, no wire formats, no storage logic belongs here.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use till_schemas::RemoteOrder;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors an [`OrderSource`] implementation may return.
#[derive(Debug)]
pub enum SourceError {
    /// Network or transport failure (connect error, timeout). Retryable:
    /// push reconnects with backoff, poll retries on its next tick.
    Transport(String),
    /// The platform returned a non-2xx application response. Retryable.
    Api { status: u16, message: String },
    /// A response payload could not be decoded. Not retryable — retrying
    /// the same bytes cannot succeed; the payload is logged and skipped.
    Decode(String),
    /// A required configuration value (tenant, key, endpoint) is missing or
    /// invalid. Fatal at startup.
    Config(String),
}

impl SourceError {
    /// Whether a later identical request can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Transport(_) | SourceError::Api { .. })
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Transport(msg) => write!(f, "transport error: {msg}"),
            SourceError::Api { status, message } => {
                write!(f, "platform api error status={status}: {message}")
            }
            SourceError::Decode(msg) => write!(f, "decode error: {msg}"),
            SourceError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Remote ordering-platform query contract.
///
/// Implementations must be object-safe (`Box<dyn OrderSource>` /
/// `Arc<dyn OrderSource>`) and `Send + Sync` so both channel tasks can
/// share one instance.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Human-readable name identifying this source (e.g. `"http"`).
    fn name(&self) -> &'static str;

    /// Fetch all remote orders with `created_at >= since`, ascending by
    /// `created_at`.
    ///
    /// Must be safe to call repeatedly with overlapping windows: the
    /// reconciler deduplicates, so a re-fetch is cheap and harmless.
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<RemoteOrder>, SourceError>;

    /// Fetch a single order by its remote id. Returns `None` when the
    /// platform does not know the id.
    ///
    /// Used to hydrate push events that carry only a bare id.
    async fn fetch_by_id(&self, remote_id: &str) -> Result<Option<RemoteOrder>, SourceError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
