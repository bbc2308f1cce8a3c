//! Rig context.
//!
//! [`Rig`] owns one instance of every component, wires them to a single
//! [`HardwareContext`], and guarantees the shutdown sequence on every exit
//! path (explicit call, error return, panic unwind):
//!
//! 1. disable the axis driver
//! 2. pump duty 0
//! 3. relay off
//!
//! Each step is attempted even if the previous one failed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ecm_common::hal::clock::Clock;
use ecm_common::hal::driver::RigDriver;
use ecm_common::rig::config::RigConfig;
use ecm_common::rig::types::{PowerSnapshot, Switch};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{MotionError, RigError};
use crate::hardware::HardwareContext;
use crate::homing::{HomingPhase, HomingReport, HomingSequence};
use crate::input::InputLayer;
use crate::instrument::Instrumentation;
use crate::motion::{AxisState, MoveReport, StepGenerator};
use crate::pump::{PumpCommand, PumpController};
use crate::safety::{
    ArmOutcome, EstopMonitor, EstopTransition, InterlockState, PowerCutDetector, SafetyInterlock,
    SafetyPoll, SafetyWatch,
};

// ─── Snapshot ───────────────────────────────────────────────────────

/// Observable rig state, suitable for journaling after a transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RigSnapshot {
    /// Axis flags.
    pub axis: AxisState,
    /// Homing phase.
    pub homing: HomingPhase,
    /// Interlock flags.
    pub interlock: InterlockState,
    /// Pump command.
    pub pump: PumpCommand,
    /// Estimated flow [L/min].
    pub flow_lpm: f64,
    /// Instrumentation readings.
    pub power: PowerSnapshot,
}

// ─── Shutdown Report ────────────────────────────────────────────────

/// Shutdown actions, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStep {
    /// De-energize the stepper driver.
    DisableAxis,
    /// Pump PWM to 0.
    PumpOff,
    /// Relay off.
    RelayOff,
    /// Stop the E-STOP monitor thread.
    StopMonitor,
    /// Driver teardown.
    DriverShutdown,
}

/// Outcome of one shutdown step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownOutcome {
    /// Step.
    pub step: ShutdownStep,
    /// Error text if the step failed.
    pub error: Option<String>,
}

/// Result of the shutdown sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Every attempted step, in order.
    pub steps: Vec<ShutdownOutcome>,
}

impl ShutdownReport {
    fn record<E: std::fmt::Display>(&mut self, step: ShutdownStep, result: Result<(), E>) {
        let error = result.err().map(|e| {
            error!("Shutdown step {step:?} failed: {e}");
            e.to_string()
        });
        self.steps.push(ShutdownOutcome { step, error });
    }

    /// Every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|s| s.error.is_none())
    }

    /// Steps in the order they were attempted.
    pub fn order(&self) -> Vec<ShutdownStep> {
        self.steps.iter().map(|s| s.step).collect()
    }
}

// ─── Rig ────────────────────────────────────────────────────────────

/// Owned rig: components, monitor thread and shutdown guarantee.
pub struct Rig {
    config: Arc<RigConfig>,
    hw: HardwareContext,
    inputs: Arc<InputLayer>,
    interlock: Arc<SafetyInterlock>,
    stepper: StepGenerator,
    homing: HomingSequence,
    pump: Arc<PumpController>,
    instruments: Instrumentation,
    cancel: Arc<AtomicBool>,
    watch: SafetyWatch,
    monitor: Option<EstopMonitor>,
    shutdown_report: Option<ShutdownReport>,
}

impl Rig {
    /// Validate `config`, initialize `driver` and build every component.
    ///
    /// All outputs come up safe: relay off, axis disabled, pump 0. An E-STOP
    /// already pressed at start-up is latched so `arm()` is refused.
    ///
    /// # Errors
    ///
    /// Invalid config, or any line that cannot be configured or read.
    pub fn start(
        config: RigConfig,
        mut driver: Box<dyn RigDriver>,
        clock: Arc<dyn Clock>,
        instruments: Instrumentation,
    ) -> Result<Self, RigError> {
        config.validate()?;
        driver.init(&config)?;
        info!(
            "Driver '{}' v{} initialized for {}",
            driver.name(),
            driver.version(),
            config.shared.service_name
        );

        let driver: Arc<dyn RigDriver> = Arc::from(driver);
        let hw = HardwareContext::new(Arc::clone(&driver), clock);
        match Self::assemble(Arc::new(config), hw, instruments) {
            Ok(rig) => Ok(rig),
            Err(e) => {
                if let Err(down) = driver.shutdown() {
                    warn!("Driver shutdown after failed start: {down}");
                }
                Err(e)
            }
        }
    }

    fn assemble(
        config: Arc<RigConfig>,
        hw: HardwareContext,
        instruments: Instrumentation,
    ) -> Result<Self, RigError> {
        let interlock = Arc::new(SafetyInterlock::new(&hw)?);
        let inputs = Arc::new(InputLayer::new(&hw, &config.inputs)?);
        let cancel = Arc::new(AtomicBool::new(false));
        let stepper = StepGenerator::new(
            &hw,
            &config.motion,
            Arc::clone(&inputs),
            Arc::clone(&interlock),
            Arc::clone(&cancel),
        )?;
        let pump = Arc::new(PumpController::new(&hw, &config.pump, Arc::clone(&interlock))?);

        if inputs.is_triggered(Switch::Estop) {
            interlock.on_estop_edge(true);
        }

        let homing = HomingSequence::new(&config.homing);
        let watch = build_watch(&config, &inputs, &interlock, &pump, &instruments);

        Ok(Self {
            config,
            hw,
            inputs,
            interlock,
            stepper,
            homing,
            pump,
            instruments,
            cancel,
            watch,
            monitor: None,
            shutdown_report: None,
        })
    }

    // ─── Safety ─────────────────────────────────────────────────────

    /// Start the background E-STOP monitor at `safety.poll_ms`.
    ///
    /// # Errors
    ///
    /// Thread spawn failure.
    pub fn start_monitor(&mut self) -> Result<(), RigError> {
        if self.monitor.is_some() {
            return Ok(());
        }
        let watch = self.safety_watch();
        self.monitor = Some(EstopMonitor::spawn(watch, self.config.safety.poll_interval())?);
        Ok(())
    }

    /// A new watch over this rig's inputs, interlock and pump, for a
    /// caller-driven monitor loop.
    pub fn safety_watch(&self) -> SafetyWatch {
        build_watch(
            &self.config,
            &self.inputs,
            &self.interlock,
            &self.pump,
            &self.instruments,
        )
    }

    /// Whether the background monitor is running.
    pub fn monitor_running(&self) -> bool {
        self.monitor.as_ref().is_some_and(EstopMonitor::is_running)
    }

    /// Run one safety poll on the calling thread.
    pub fn poll_safety(&mut self) -> SafetyPoll {
        self.watch.poll()
    }

    /// Energize the relay unless the E-STOP is active.
    pub fn arm(&self) -> Result<ArmOutcome, RigError> {
        Ok(self.interlock.arm()?)
    }

    /// Relay off.
    pub fn disarm(&self) -> Result<(), RigError> {
        Ok(self.interlock.disarm()?)
    }

    /// Latch a software E-STOP and stop the pump.
    pub fn trip(&self, reason: &str) -> EstopTransition {
        let transition = self.interlock.trip(reason);
        self.pump.off();
        transition
    }

    /// Clear a latched software E-STOP. Does not re-arm.
    pub fn clear_trip(&self) -> EstopTransition {
        self.interlock.clear_trip()
    }

    /// Block until the E-STOP clears, at most `timeout`.
    pub fn wait_estop_clear(&self, timeout: Duration) -> bool {
        self.interlock.wait_clear(
            self.hw.clock.as_ref(),
            self.config.safety.poll_interval(),
            timeout,
        )
    }

    /// Interlock flags.
    pub fn interlock_state(&self) -> InterlockState {
        self.interlock.state()
    }

    /// Relay energized and E-STOP clear.
    pub fn is_armed(&self) -> bool {
        self.interlock.is_armed()
    }

    // ─── Motion ─────────────────────────────────────────────────────

    /// Energize the stepper driver.
    pub fn enable_axis(&mut self) -> Result<(), RigError> {
        Ok(self.stepper.enable()?)
    }

    /// De-energize the stepper driver; position is lost.
    pub fn disable_axis(&mut self) -> Result<(), RigError> {
        Ok(self.stepper.disable()?)
    }

    /// Run a homing cycle.
    pub fn home(&mut self) -> Result<HomingReport, MotionError> {
        self.homing.run(&mut self.stepper, &self.inputs)
    }

    /// Relative move (positive = up) at a clamped feed.
    pub fn move_mm(&mut self, distance_mm: f64, feed_mm_s: f64) -> Result<MoveReport, MotionError> {
        self.stepper.move_mm(distance_mm, feed_mm_s)
    }

    /// Axis flags.
    pub fn axis(&self) -> AxisState {
        self.stepper.axis()
    }

    /// Homing phase.
    pub fn homing_phase(&self) -> HomingPhase {
        self.homing.phase()
    }

    // ─── Pump ───────────────────────────────────────────────────────

    /// Pump duty [%], clamped and gated by the interlock.
    pub fn set_pump_duty(&self, percent: f64) -> PumpCommand {
        self.pump.set_duty(percent)
    }

    /// Pump at the configured run duty.
    pub fn pump_on(&self) -> PumpCommand {
        self.pump.on()
    }

    /// Pump off.
    pub fn pump_off(&self) -> PumpCommand {
        self.pump.off()
    }

    /// Estimated flow [L/min].
    pub fn flow_rate(&self) -> f64 {
        self.pump.flow_rate()
    }

    // ─── Context ────────────────────────────────────────────────────

    /// Current state of every component.
    pub fn snapshot(&self) -> RigSnapshot {
        RigSnapshot {
            axis: self.stepper.axis(),
            homing: self.homing.phase(),
            interlock: self.interlock.state(),
            pump: self.pump.command(),
            flow_lpm: self.pump.flow_rate(),
            power: self.instruments.snapshot(),
        }
    }

    /// Flag checked before every pulse; set it to cancel motion.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Validated configuration.
    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    /// Rig clock.
    pub fn clock(&self) -> &dyn Clock {
        self.hw.clock.as_ref()
    }

    // ─── Shutdown ───────────────────────────────────────────────────

    /// Disable axis, pump 0, relay off, then stop the monitor and the
    /// driver. Runs once; later calls return the first report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if let Some(report) = &self.shutdown_report {
            return report.clone();
        }

        info!("Rig shutdown");
        let mut report = ShutdownReport::default();
        report.record(ShutdownStep::DisableAxis, self.stepper.disable());
        report.record(ShutdownStep::PumpOff, self.pump.try_set_duty(0.0).map(|_| ()));
        report.record(ShutdownStep::RelayOff, self.interlock.disarm());

        let monitor = match self.monitor.take() {
            Some(mut monitor) => {
                if monitor.stop() {
                    Ok(())
                } else {
                    Err("monitor thread panicked")
                }
            }
            None => Ok(()),
        };
        report.record(ShutdownStep::StopMonitor, monitor);
        report.record(ShutdownStep::DriverShutdown, self.hw.driver.shutdown());

        if report.is_clean() {
            info!("Rig shutdown complete");
        } else {
            warn!("Rig shutdown completed with errors");
        }
        self.shutdown_report = Some(report.clone());
        report
    }

    /// Whether shutdown already ran.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown_report.is_some()
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        if self.shutdown_report.is_none() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for Rig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rig")
            .field("hw", &self.hw)
            .field("axis", &self.stepper.axis())
            .field("interlock", &self.interlock.state())
            .field("homing", &self.homing.phase())
            .field("monitor", &self.monitor_running())
            .finish_non_exhaustive()
    }
}

fn build_watch(
    config: &RigConfig,
    inputs: &Arc<InputLayer>,
    interlock: &Arc<SafetyInterlock>,
    pump: &Arc<PumpController>,
    instruments: &Instrumentation,
) -> SafetyWatch {
    let watch = SafetyWatch::new(Arc::clone(inputs), Arc::clone(interlock)).with_pump(Arc::clone(pump));
    match config.safety.power_cut_bus_v {
        Some(threshold) if instruments.has_ecm() => watch.with_power_cut(
            instruments.clone(),
            PowerCutDetector::new(threshold, config.safety.power_cut_samples),
        ),
        Some(_) => {
            warn!("Power-cut detection configured but no ECM sensor fitted");
            watch
        }
        None => watch,
    }
}
