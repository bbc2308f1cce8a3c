//! Safety relay interlock.
//!
//! The relay feeds both the ECM supply and the pump branch. It may be
//! energized only by an explicit [`SafetyInterlock::arm`] while the E-STOP is
//! not active. An E-STOP press (hardware edge or software trip) drops the
//! relay synchronously, and releasing the E-STOP never re-arms on its own.
//!
//! `relay_energized` and `estop_active` are atomics so the step generator
//! can check them before every pulse without taking a lock; transitions are
//! serialized by a mutex so arm and E-STOP can race without leaving the
//! relay energized while the E-STOP is active.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ecm_common::hal::clock::Clock;
use ecm_common::hal::driver::{HalError, RigDriver};
use ecm_common::rig::types::OutputLine;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::hardware::HardwareContext;

// ─── Outcomes ───────────────────────────────────────────────────────

/// Result of an arm request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// Relay energized.
    Armed,
    /// Relay was already energized; nothing written.
    AlreadyArmed,
    /// Request refused; relay stays off.
    Refused(ArmRefusal),
}

impl ArmOutcome {
    /// Whether the relay is energized after the request.
    pub fn is_armed(self) -> bool {
        matches!(self, Self::Armed | Self::AlreadyArmed)
    }
}

/// Why an arm request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmRefusal {
    /// E-STOP pressed or software trip latched.
    EstopActive,
}

/// Effect of an E-STOP level report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstopTransition {
    /// E-STOP became active; relay dropped.
    Pressed,
    /// E-STOP cleared; the rig stays disarmed until re-armed.
    Released,
    /// No change.
    Unchanged,
}

/// Observable interlock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterlockState {
    /// Hardware E-STOP pressed or software trip latched.
    pub estop_active: bool,
    /// Relay coil driven.
    pub relay_energized: bool,
}

// ─── Interlock ──────────────────────────────────────────────────────

/// Relay interlock shared by the control thread and the E-STOP monitor.
pub struct SafetyInterlock {
    driver: Arc<dyn RigDriver>,
    hw_pressed: AtomicBool,
    soft_trip: AtomicBool,
    relay_energized: AtomicBool,
    transition: Mutex<()>,
}

impl SafetyInterlock {
    /// Create the interlock and drive the relay off.
    ///
    /// # Errors
    ///
    /// Fails if the relay line cannot be written; the rig must not start.
    pub fn new(hw: &HardwareContext) -> Result<Self, HalError> {
        hw.driver.write_output(OutputLine::Relay, false)?;
        Ok(Self {
            driver: Arc::clone(&hw.driver),
            hw_pressed: AtomicBool::new(false),
            soft_trip: AtomicBool::new(false),
            relay_energized: AtomicBool::new(false),
            transition: Mutex::new(()),
        })
    }

    /// Energize the relay unless the E-STOP is active.
    ///
    /// # Errors
    ///
    /// A failed relay write leaves the interlock disarmed.
    pub fn arm(&self) -> Result<ArmOutcome, HalError> {
        let _guard = self.transition.lock();

        if self.estop_active() {
            warn!("Arm refused: E-STOP active");
            return Ok(ArmOutcome::Refused(ArmRefusal::EstopActive));
        }
        if self.relay_energized.load(Ordering::Acquire) {
            return Ok(ArmOutcome::AlreadyArmed);
        }

        self.driver.write_output(OutputLine::Relay, true)?;
        self.relay_energized.store(true, Ordering::Release);
        info!("Interlock armed, relay energized");
        Ok(ArmOutcome::Armed)
    }

    /// De-energize the relay. Always safe to call.
    ///
    /// The armed flag drops before the write, so motion stops even when the
    /// write itself fails.
    pub fn disarm(&self) -> Result<(), HalError> {
        let _guard = self.transition.lock();
        self.drop_relay()
    }

    fn drop_relay(&self) -> Result<(), HalError> {
        let was_armed = self.relay_energized.swap(false, Ordering::AcqRel);
        self.driver.write_output(OutputLine::Relay, false)?;
        if was_armed {
            info!("Interlock disarmed, relay off");
        }
        Ok(())
    }

    /// Report the debounced hardware E-STOP level.
    ///
    /// A press drops the relay before returning.
    pub fn on_estop_edge(&self, pressed: bool) -> EstopTransition {
        let _guard = self.transition.lock();
        let before = self.estop_active();
        self.hw_pressed.store(pressed, Ordering::Release);
        self.settle_transition(before, "E-STOP")
    }

    /// Latch a software E-STOP (e.g. power cut, operator abort).
    pub fn trip(&self, reason: &str) -> EstopTransition {
        let _guard = self.transition.lock();
        let before = self.estop_active();
        self.soft_trip.store(true, Ordering::Release);
        if !before {
            warn!("Software E-STOP: {reason}");
        }
        self.settle_transition(before, "software trip")
    }

    /// Clear a latched software trip. Does not re-arm.
    pub fn clear_trip(&self) -> EstopTransition {
        let _guard = self.transition.lock();
        let before = self.estop_active();
        self.soft_trip.store(false, Ordering::Release);
        self.settle_transition(before, "software trip")
    }

    fn settle_transition(&self, before: bool, source: &str) -> EstopTransition {
        let after = self.estop_active();
        if after {
            // Drop the relay on every active report, not only on the edge.
            if let Err(e) = self.drop_relay() {
                warn!("Relay write failed while handling {source}: {e}");
            }
        }
        match (before, after) {
            (false, true) => {
                warn!("{source} active, rig disarmed");
                EstopTransition::Pressed
            }
            (true, false) => {
                info!("{source} cleared, re-arm required");
                EstopTransition::Released
            }
            _ => EstopTransition::Unchanged,
        }
    }

    /// Relay energized and E-STOP not active.
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.relay_energized.load(Ordering::Acquire) && !self.estop_active()
    }

    /// Hardware E-STOP pressed or software trip latched.
    #[inline]
    pub fn estop_active(&self) -> bool {
        self.hw_pressed.load(Ordering::Acquire) || self.soft_trip.load(Ordering::Acquire)
    }

    /// Current flags.
    pub fn state(&self) -> InterlockState {
        InterlockState {
            estop_active: self.estop_active(),
            relay_energized: self.relay_energized.load(Ordering::Acquire),
        }
    }

    /// Block until the E-STOP clears, polling every `poll`.
    ///
    /// Returns `false` on timeout. The E-STOP monitor must be running for
    /// hardware releases to be observed.
    pub fn wait_clear(&self, clock: &dyn Clock, poll: Duration, timeout: Duration) -> bool {
        let deadline = clock.now() + timeout;
        loop {
            if !self.estop_active() {
                return true;
            }
            if clock.now() >= deadline {
                return false;
            }
            clock.sleep(poll);
        }
    }
}

impl std::fmt::Debug for SafetyInterlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyInterlock")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
