//! Flow estimation from sensor pulse timestamps.
//!
//! The hall-effect flow sensor emits a fixed number of pulses per litre.
//! Timestamps are kept for one lookback window; the rate is the pulse count
//! in that window scaled to litres per minute.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ecm_common::hal::clock::Clock;
use parking_lot::Mutex;

// ─── Window ─────────────────────────────────────────────────────────

/// Sliding window of pulse timestamps.
#[derive(Debug, Clone)]
pub struct FlowWindow {
    lookback: Duration,
    stamps: VecDeque<Duration>,
}

impl FlowWindow {
    /// Empty window of length `lookback`.
    pub fn new(lookback: Duration) -> Self {
        Self {
            lookback,
            stamps: VecDeque::new(),
        }
    }

    /// Record a pulse at `t` and drop stamps that fell out of the window.
    ///
    /// Stamps are kept in order; a `t` earlier than the newest stamp is
    /// recorded at the newest stamp's time.
    pub fn record(&mut self, t: Duration) {
        let t = self.stamps.back().map_or(t, |&last| t.max(last));
        self.stamps.push_back(t);
        self.prune(t);
    }

    /// Drop stamps older than `now - lookback`.
    pub fn prune(&mut self, now: Duration) {
        while let Some(&oldest) = self.stamps.front() {
            if now.saturating_sub(oldest) > self.lookback {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Pulses currently in the window.
    pub fn count(&self) -> usize {
        self.stamps.len()
    }

    /// Window length.
    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Flow in L/min for `pulses_per_liter`, as of `now`.
    ///
    /// Zero when the calibration is not positive.
    pub fn rate_lpm(&mut self, now: Duration, pulses_per_liter: f64) -> f64 {
        if !(pulses_per_liter > 0.0) {
            return 0.0;
        }
        self.prune(now);
        let window_s = self.lookback.as_secs_f64();
        if window_s <= 0.0 {
            return 0.0;
        }
        (self.count() as f64 / window_s) * 60.0 / pulses_per_liter
    }
}

// ─── Meter ──────────────────────────────────────────────────────────

/// Thread-safe flow meter fed from the driver's pulse callback.
pub struct FlowMeter {
    clock: Arc<dyn Clock>,
    pulses_per_liter: f64,
    window: Mutex<FlowWindow>,
}

impl FlowMeter {
    /// Meter with the given calibration and lookback.
    pub fn new(clock: Arc<dyn Clock>, pulses_per_liter: f64, lookback: Duration) -> Self {
        Self {
            clock,
            pulses_per_liter,
            window: Mutex::new(FlowWindow::new(lookback)),
        }
    }

    /// Record one pulse now.
    pub fn record_pulse(&self) {
        let now = self.clock.now();
        self.window.lock().record(now);
    }

    /// Estimated flow [L/min].
    pub fn rate_lpm(&self) -> f64 {
        let now = self.clock.now();
        self.window.lock().rate_lpm(now, self.pulses_per_liter)
    }

    /// Calibration [pulses/L].
    pub fn pulses_per_liter(&self) -> f64 {
        self.pulses_per_liter
    }
}

impl std::fmt::Debug for FlowMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowMeter")
            .field("pulses_per_liter", &self.pulses_per_liter)
            .field("window", &*self.window.lock())
            .finish_non_exhaustive()
    }
}
