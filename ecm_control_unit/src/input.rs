//! Debounced switch inputs.
//!
//! Each switch gets a [`Debouncer`]: a raw level change is accepted only
//! after it has been observed continuously for the debounce interval.
//! Debouncing is sample-driven, so a state only advances when somebody
//! polls it; the step generator polls both limits before every pulse and
//! the E-STOP monitor polls the E-STOP every cycle.
//!
//! A read failure after start-up is fail-safe: the switch reports
//! `Triggered`, which stops motion toward a limit and disarms on E-STOP.

use std::time::Duration;

use ecm_common::hal::clock::Clock;
use ecm_common::hal::driver::{HalError, RigDriver};
use ecm_common::rig::config::InputsConfig;
use ecm_common::rig::types::{Polarity, Switch, SwitchState};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::hardware::HardwareContext;

// ─── Debouncer ──────────────────────────────────────────────────────

/// Time-based debounce of one logical level.
#[derive(Debug, Clone)]
pub struct Debouncer {
    interval: Duration,
    accepted: Option<bool>,
    candidate: bool,
    candidate_since: Duration,
}

impl Debouncer {
    /// Create a debouncer with no accepted level yet.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            accepted: None,
            candidate: false,
            candidate_since: Duration::ZERO,
        }
    }

    /// Feed one sample taken at `now`; returns the accepted level.
    ///
    /// The first sample is accepted as-is.
    pub fn update(&mut self, level: bool, now: Duration) -> bool {
        let Some(accepted) = self.accepted else {
            self.accepted = Some(level);
            self.candidate = level;
            self.candidate_since = now;
            return level;
        };

        if level != self.candidate {
            self.candidate = level;
            self.candidate_since = now;
        }

        if self.candidate != accepted && now.saturating_sub(self.candidate_since) >= self.interval
        {
            self.accepted = Some(self.candidate);
            return self.candidate;
        }
        accepted
    }

    /// Last accepted level, if any sample was taken.
    pub fn accepted(&self) -> Option<bool> {
        self.accepted
    }
}

// ─── Input Layer ────────────────────────────────────────────────────

/// Debounced logical view of the three switch inputs.
pub struct InputLayer {
    driver: Arc<dyn RigDriver>,
    clock: Arc<dyn Clock>,
    debounce: Duration,
    polarity: [Polarity; 3],
    switches: [Mutex<Debouncer>; 3],
}

impl InputLayer {
    /// Build the layer and probe every switch once.
    ///
    /// # Errors
    ///
    /// A switch that cannot be read at start-up is fatal: the rig must not
    /// proceed to motion without its limits and E-STOP.
    pub fn new(hw: &HardwareContext, config: &InputsConfig) -> Result<Self, HalError> {
        let debounce = config.debounce();
        let layer = Self {
            driver: Arc::clone(&hw.driver),
            clock: Arc::clone(&hw.clock),
            debounce,
            polarity: Switch::ALL.map(|sw| config.polarity(sw)),
            switches: Switch::ALL.map(|_| Mutex::new(Debouncer::new(debounce))),
        };

        for sw in Switch::ALL {
            let raw = layer.driver.read_switch(sw)?;
            let triggered = layer.polarity[sw.index()].is_triggered(raw);
            let now = layer.clock.now();
            layer.switches[sw.index()].lock().update(triggered, now);
            info!(
                "Input {sw}: {:?}, {:?}",
                SwitchState::from_triggered(triggered),
                layer.polarity[sw.index()]
            );
        }

        Ok(layer)
    }

    /// Sample `switch` and return its debounced state.
    pub fn read(&self, switch: Switch) -> SwitchState {
        let raw = match self.driver.read_switch(switch) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Input {switch} read failed ({e}), treating as triggered");
                return SwitchState::Triggered;
            }
        };

        let triggered = self.polarity[switch.index()].is_triggered(raw);
        let now = self.clock.now();
        let mut deb = self.switches[switch.index()].lock();
        let before = deb.accepted();
        let accepted = deb.update(triggered, now);
        if before != Some(accepted) {
            debug!("Input {switch} -> {:?}", SwitchState::from_triggered(accepted));
        }
        SwitchState::from_triggered(accepted)
    }

    /// Whether `switch` reads as triggered.
    #[inline]
    pub fn is_triggered(&self, switch: Switch) -> bool {
        self.read(switch).is_triggered()
    }

    /// Sample, wait one debounce interval, sample again.
    ///
    /// Lets a level change that happened while nobody was polling settle
    /// into the accepted state.
    pub fn settle(&self, switch: Switch) -> SwitchState {
        self.read(switch);
        self.clock.sleep(self.debounce);
        self.read(switch)
    }

    /// Configured debounce interval.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

impl std::fmt::Debug for InputLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputLayer")
            .field("debounce", &self.debounce)
            .field("polarity", &self.polarity)
            .finish_non_exhaustive()
    }
}
