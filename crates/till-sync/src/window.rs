//! Gap-recovery fetch-window policy.
//!
//! The poll channel cannot rely on a durable server-side cursor; the fetch
//! window is reconstructed from the local checkpoint on every tick:
//!
//! - checkpoint younger than the same-day horizon → start of the current
//!   calendar day in the store's timezone (a closed app only needs its own
//!   business day rescanned; re-fetching is idempotent and cheap);
//! - checkpoint older than that but within the stale horizon → the stale
//!   horizon back;
//! - no checkpoint, or one older than the stale horizon → the full
//!   backfill window (long-dormant device, bounded historical catch-up).
//!
//! The thresholds are policy, not load-bearing constants: they arrive from
//! configuration.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;

use till_config::SyncSettings;

#[derive(Debug, Clone)]
pub struct WindowPolicy {
    same_day_horizon: Duration,
    stale_horizon: Duration,
    backfill: Duration,
    tz: Tz,
}

impl WindowPolicy {
    pub fn new(
        same_day_horizon: Duration,
        stale_horizon: Duration,
        backfill: Duration,
        tz: Tz,
    ) -> Self {
        Self {
            same_day_horizon,
            stale_horizon,
            backfill,
            tz,
        }
    }

    /// Build from validated settings. Fails on an unknown timezone name —
    /// a config error surfaced at startup, not mid-stream.
    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        let tz: Tz = settings
            .store_timezone
            .parse()
            .map_err(|_| anyhow!("unknown store timezone: {}", settings.store_timezone))?;
        Ok(Self::new(
            Duration::hours(settings.same_day_horizon_hours),
            Duration::days(settings.stale_horizon_days),
            Duration::days(settings.backfill_days),
            tz,
        ))
    }

    /// Compute the `fetch_since` window start for the given checkpoint age.
    pub fn window_start(
        &self,
        checkpoint: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let Some(cp) = checkpoint else {
            return now - self.backfill;
        };

        let age = now - cp;
        if age < self.same_day_horizon {
            self.start_of_day(now)
        } else if age < self.stale_horizon {
            now - self.stale_horizon
        } else {
            now - self.backfill
        }
    }

    /// Midnight of `now`'s calendar day in the store timezone, as UTC.
    fn start_of_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_day = now.with_timezone(&self.tz).date_naive();
        let midnight = local_day.and_hms_opt(0, 0, 0).unwrap_or_default();
        match self.tz.from_local_datetime(&midnight).earliest() {
            Some(local) => local.with_timezone(&Utc),
            // A timezone transition can make local midnight nonexistent;
            // fall back to a full same-day-horizon rescan.
            None => now - self.same_day_horizon,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
