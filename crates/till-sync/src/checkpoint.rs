//! In-process checkpoint watermark.
//!
//! # Invariants
//!
//! - **Strictly forward**: the watermark advances only when offered a
//!   timestamp newer than the current value; older or equal offers are
//!   no-ops.
//! - **Advance only on acceptance**: a rejected offer leaves the watermark
//!   untouched.
//! - **Pure, no IO**: the store carries its own `max()` guard for the
//!   cross-process case; this type keeps the common in-process path cheap.

use chrono::{DateTime, Utc};

/// Tracks the newest `created_at` confirmed Synced, enforcing monotonicity
/// before the store is asked to persist a checkpoint advance.
///
/// Seed from the stored checkpoint at startup with
/// [`CheckpointWatermark::seeded`]; a fresh install starts empty and
/// accepts any timestamp.
#[derive(Clone, Debug, Default)]
pub struct CheckpointWatermark {
    last_synced_at: Option<DateTime<Utc>>,
}

impl CheckpointWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(last_synced_at: Option<DateTime<Utc>>) -> Self {
        Self { last_synced_at }
    }

    /// Would `ts` advance the watermark? Read-only.
    pub fn check(&self, ts: DateTime<Utc>) -> bool {
        match self.last_synced_at {
            None => true,
            Some(current) => ts > current,
        }
    }

    /// Advance to `ts` if it is strictly newer. Returns whether the
    /// watermark moved.
    pub fn advance(&mut self, ts: DateTime<Utc>) -> bool {
        if self.check(ts) {
            self.last_synced_at = Some(ts);
            true
        } else {
            false
        }
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
