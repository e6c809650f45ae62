//! Reconnect delay policy for the push channel.
//!
//! # Invariants
//!
//! - The base delay doubles on every failed attempt, capped at a ceiling.
//! - Random jitter (bounded, additive) is applied per attempt so a fleet of
//!   devices does not reconnect against the platform in lockstep.
//! - `reset` restores the initial delay after a successful connection.
//! - Pure apart from the jitter draw; no clocks, no IO.

use std::time::Duration;

use rand::Rng;

#[derive(Clone, Debug)]
pub struct ReconnectBackoff {
    base: Duration,
    ceiling: Duration,
    current: Duration,
    jitter_ms: u64,
}

impl ReconnectBackoff {
    /// `base` is the first retry delay; `ceiling` caps the doubling;
    /// `jitter_ms` bounds the additive random jitter per attempt.
    pub fn new(base: Duration, ceiling: Duration, jitter_ms: u64) -> Self {
        Self {
            base,
            ceiling,
            current: base,
            jitter_ms,
        }
    }

    /// Return the delay to sleep before the next attempt and advance the
    /// internal doubling state.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        let delay = self.current + Duration::from_millis(jitter);

        let doubled = self.current.saturating_mul(2);
        self.current = doubled.min(self.ceiling);

        delay
    }

    /// Restore the initial delay. Called after a connection is established.
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// The base delay the next attempt would start from, without jitter.
    pub fn current_base(&self) -> Duration {
        self.current
    }
}

impl Default for ReconnectBackoff {
    /// 1s doubling to a 30s ceiling with up to 400ms of jitter.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 400)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
