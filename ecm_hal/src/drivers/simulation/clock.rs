//! Virtual clock for the simulation backend.
//!
//! `sleep` advances virtual time instantly, so a six-second feed move runs in
//! microseconds of wall time while every half-period is still accounted for.

use ecm_common::hal::clock::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Virtual monotonic clock [ns resolution].
#[derive(Debug, Default)]
pub struct SimClock {
    now_ns: AtomicU64,
}

impl SimClock {
    /// Create a clock at t = 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance virtual time without sleeping.
    pub fn advance(&self, duration: Duration) {
        self.now_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
