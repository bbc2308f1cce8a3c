//! E-STOP monitor.
//!
//! [`SafetyWatch::poll`] samples the debounced E-STOP, forwards level
//! changes to the interlock, stops the pump on a press, and feeds the
//! power-cut detector while the rig is armed. [`EstopMonitor`] runs that
//! poll on a dedicated thread at the configured period, so an E-STOP press
//! drops the relay within `debounce + poll` even while the control thread
//! is busy pulsing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ecm_common::rig::types::{Switch, SwitchState};
use tracing::{debug, info, warn};

use super::interlock::{EstopTransition, SafetyInterlock};
use super::power_cut::{PowerCutDetector, PowerVerdict};
use crate::error::RigError;
use crate::input::InputLayer;
use crate::instrument::Instrumentation;
use crate::pump::PumpController;

/// What one poll observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyPoll {
    /// Debounced E-STOP state.
    pub estop: SwitchState,
    /// Interlock transition caused by this poll.
    pub transition: EstopTransition,
    /// Power-cut verdict, when the detector ran.
    pub power: Option<PowerVerdict>,
}

// ─── Watch ──────────────────────────────────────────────────────────

/// One E-STOP / power-cut polling context.
pub struct SafetyWatch {
    inputs: Arc<InputLayer>,
    interlock: Arc<SafetyInterlock>,
    pump: Option<Arc<PumpController>>,
    power: Option<(Instrumentation, PowerCutDetector)>,
    last: Option<SwitchState>,
}

impl SafetyWatch {
    /// Watch the E-STOP and drive `interlock`.
    pub fn new(inputs: Arc<InputLayer>, interlock: Arc<SafetyInterlock>) -> Self {
        Self {
            inputs,
            interlock,
            pump: None,
            power: None,
            last: None,
        }
    }

    /// Stop this pump on every E-STOP press.
    pub fn with_pump(mut self, pump: Arc<PumpController>) -> Self {
        self.pump = Some(pump);
        self
    }

    /// Disarm when `instruments` report a power cut.
    pub fn with_power_cut(mut self, instruments: Instrumentation, detector: PowerCutDetector) -> Self {
        self.power = Some((instruments, detector));
        self
    }

    /// Run one poll cycle.
    pub fn poll(&mut self) -> SafetyPoll {
        let estop = self.inputs.read(Switch::Estop);

        let transition = if self.last != Some(estop) {
            self.last = Some(estop);
            self.interlock.on_estop_edge(estop.is_triggered())
        } else {
            EstopTransition::Unchanged
        };

        if transition == EstopTransition::Pressed {
            if let Some(pump) = &self.pump {
                pump.off();
            }
        }

        let power = self.check_power();

        SafetyPoll {
            estop,
            transition,
            power,
        }
    }

    fn check_power(&mut self) -> Option<PowerVerdict> {
        let (instruments, detector) = self.power.as_mut()?;

        // Bus voltage is downstream of the relay: only meaningful while armed.
        if !self.interlock.is_armed() {
            detector.reset();
            return None;
        }

        let verdict = detector.observe(&instruments.snapshot());
        if verdict == PowerVerdict::Cut {
            warn!("ECM bus power lost, disarming");
            if let Err(e) = self.interlock.disarm() {
                warn!("Relay write failed on power cut: {e}");
            }
            if let Some(pump) = &self.pump {
                pump.off();
            }
            detector.reset();
        }
        Some(verdict)
    }
}

impl std::fmt::Debug for SafetyWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyWatch")
            .field("last", &self.last)
            .field("power_cut", &self.power.is_some())
            .finish_non_exhaustive()
    }
}

// ─── Monitor Thread ─────────────────────────────────────────────────

/// Background thread running a [`SafetyWatch`].
///
/// Stopped and joined on [`EstopMonitor::stop`] or drop.
#[derive(Debug)]
pub struct EstopMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EstopMonitor {
    const THREAD_NAME: &'static str = "estop-monitor";

    /// Spawn the monitor polling every `period`.
    ///
    /// The period is paced with `thread::sleep`, independent of the rig
    /// clock, so a virtual clock does not spin the thread.
    ///
    /// # Errors
    ///
    /// Returns `RigError::Thread` if the OS refuses the thread.
    pub fn spawn(mut watch: SafetyWatch, period: Duration) -> Result<Self, RigError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name(Self::THREAD_NAME.to_string())
            .spawn(move || {
                debug!("E-STOP monitor running, period {period:?}");
                while !flag.load(Ordering::Acquire) {
                    watch.poll();
                    thread::sleep(period);
                }
                debug!("E-STOP monitor stopped");
            })
            .map_err(|source| RigError::Thread {
                name: Self::THREAD_NAME,
                source,
            })?;

        info!("E-STOP monitor started ({} ms)", period.as_millis());
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Whether the thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it.
    ///
    /// Returns `false` if the thread had panicked.
    pub fn stop(&mut self) -> bool {
        self.stop.store(true, Ordering::Release);
        match self.handle.take().map(JoinHandle::join) {
            Some(Err(_)) => {
                warn!("E-STOP monitor thread panicked");
                false
            }
            _ => true,
        }
    }
}

impl Drop for EstopMonitor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
