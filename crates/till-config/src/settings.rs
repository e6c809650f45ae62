//! Typed extraction of engine settings from the merged config JSON.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::read_str_at;

/// Everything the sync engine needs from configuration, validated once at
/// startup.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Tenant identifier at the remote ordering platform.
    pub tenant_id: String,
    /// Base URL of the remote query API (e.g. `https://orders.example.com`).
    pub remote_base_url: String,
    /// WebSocket endpoint for the push stream.
    pub push_url: String,
    /// Seconds between poll ticks.
    pub poll_interval_secs: u64,
    /// Checkpoint younger than this re-scans from start of the current day.
    pub same_day_horizon_hours: i64,
    /// Checkpoint older than the same-day horizon but younger than this
    /// fetches this many days back.
    pub stale_horizon_days: i64,
    /// Fetch window for a device with no checkpoint at all.
    pub backfill_days: i64,
    /// IANA timezone name the store's business day is computed in.
    pub store_timezone: String,
    pub push_enabled: bool,
    pub poll_enabled: bool,
}

fn read_u64_at(config: &Value, pointer: &str, default: u64) -> u64 {
    config
        .pointer(pointer)
        .and_then(Value::as_u64)
        .unwrap_or(default)
}

fn read_i64_at(config: &Value, pointer: &str, default: i64) -> i64 {
    config
        .pointer(pointer)
        .and_then(Value::as_i64)
        .unwrap_or(default)
}

fn read_bool_at(config: &Value, pointer: &str, default: bool) -> bool {
    config
        .pointer(pointer)
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

impl SyncSettings {
    /// Extract settings from the merged config JSON.
    ///
    /// Tenant id and both remote endpoints are required; everything else
    /// falls back to defaults. Horizon values must be positive — a zero or
    /// negative window would silently disable gap recovery.
    pub fn from_config(config_json: &Value) -> Result<Self> {
        let Some(tenant_id) = read_str_at(config_json, "/tenant/id") else {
            bail!("CONFIG_MISSING: /tenant/id is required");
        };
        let Some(remote_base_url) = read_str_at(config_json, "/remote/base_url") else {
            bail!("CONFIG_MISSING: /remote/base_url is required");
        };
        let push_enabled = read_bool_at(config_json, "/sync/push_enabled", true);
        let push_url = match read_str_at(config_json, "/remote/push_url") {
            Some(u) => u,
            None if !push_enabled => String::new(),
            None => bail!("CONFIG_MISSING: /remote/push_url is required when push is enabled"),
        };

        let settings = Self {
            tenant_id,
            remote_base_url,
            push_url,
            poll_interval_secs: read_u64_at(config_json, "/sync/poll_interval_secs", 30),
            same_day_horizon_hours: read_i64_at(config_json, "/sync/same_day_horizon_hours", 24),
            stale_horizon_days: read_i64_at(config_json, "/sync/stale_horizon_days", 7),
            backfill_days: read_i64_at(config_json, "/sync/backfill_days", 60),
            store_timezone: read_str_at(config_json, "/store/timezone")
                .unwrap_or_else(|| "UTC".to_string()),
            push_enabled,
            poll_enabled: read_bool_at(config_json, "/sync/poll_enabled", true),
        };

        if settings.poll_interval_secs == 0 {
            bail!("CONFIG_INVALID: /sync/poll_interval_secs must be > 0");
        }
        if settings.same_day_horizon_hours <= 0
            || settings.stale_horizon_days <= 0
            || settings.backfill_days <= 0
        {
            bail!("CONFIG_INVALID: gap-recovery horizons must all be > 0");
        }

        Ok(settings)
    }
}
