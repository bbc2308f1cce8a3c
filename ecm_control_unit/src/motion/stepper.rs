//! Blocking step generator.
//!
//! Emits STEP pulses one at a time on the calling thread, holding HIGH and
//! LOW for the half-period each. Before every pulse it re-checks:
//!
//! 1. the limit facing the direction of travel is not triggered,
//! 2. the interlock is still armed,
//! 3. no cancellation was requested.
//!
//! A failed check ends the move early with a [`MoveReport`] carrying the
//! pulses actually emitted; that is an ordinary outcome, not an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ecm_common::hal::clock::Clock;
use ecm_common::hal::driver::{HalError, RigDriver};
use ecm_common::rig::config::MotionConfig;
use ecm_common::rig::types::{Direction, OutputLine, Switch};
use serde::Serialize;
use tracing::{debug, info, trace};

use super::feed::FeedLimits;
use super::plan::PulsePlan;
use crate::error::MotionError;
use crate::hardware::HardwareContext;
use crate::input::InputLayer;
use crate::safety::SafetyInterlock;

// ─── Axis State ─────────────────────────────────────────────────────

/// Logical state of the Z axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AxisState {
    /// Stepper driver energized; pulses may be emitted.
    pub enabled: bool,
    /// A full homing cycle completed since the driver was last enabled.
    pub position_known: bool,
}

// ─── Move Report ────────────────────────────────────────────────────

/// Why a pulse train ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveEnd {
    /// Every planned pulse was emitted.
    Completed,
    /// The limit facing the travel direction read triggered.
    LimitReached(Switch),
    /// The interlock was no longer armed.
    Disarmed,
    /// Cancellation requested.
    Cancelled,
}

/// Result of one move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveReport {
    /// Travel direction; `None` for a zero-length move.
    pub direction: Option<Direction>,
    /// Pulses planned.
    pub requested: u64,
    /// Pulses emitted.
    pub completed: u64,
    /// Why the train ended.
    pub end: MoveEnd,
    /// Half-period used.
    pub half_period: Duration,
}

impl MoveReport {
    fn noop() -> Self {
        Self {
            direction: None,
            requested: 0,
            completed: 0,
            end: MoveEnd::Completed,
            half_period: Duration::ZERO,
        }
    }

    /// Ended before the planned count.
    pub fn is_short(&self) -> bool {
        self.end != MoveEnd::Completed
    }

    /// Time spent pulsing: `2 × half_period × completed`.
    pub fn elapsed(&self) -> Duration {
        let ns = self.half_period.as_nanos() * 2 * u128::from(self.completed);
        Duration::from_nanos(u64::try_from(ns).unwrap_or(u64::MAX))
    }

    /// Signed travel actually commanded [mm].
    pub fn distance_mm(&self, steps_per_mm: f64) -> f64 {
        let sign = self.direction.map_or(0, Direction::sign) as f64;
        sign * self.completed as f64 / steps_per_mm
    }
}

// ─── Step Generator ─────────────────────────────────────────────────

/// STEP/DIR/ENABLE owner and pulse emitter.
pub struct StepGenerator {
    driver: Arc<dyn RigDriver>,
    clock: Arc<dyn Clock>,
    inputs: Arc<InputLayer>,
    interlock: Arc<SafetyInterlock>,
    cancel: Arc<AtomicBool>,
    limits: FeedLimits,
    steps_per_mm: f64,
    max_stroke_mm: f64,
    axis: AxisState,
}

impl StepGenerator {
    /// Create the generator with the driver disabled and STEP low.
    ///
    /// `cancel` is polled before every pulse.
    ///
    /// # Errors
    ///
    /// Fails if ENABLE or STEP cannot be written.
    pub fn new(
        hw: &HardwareContext,
        config: &MotionConfig,
        inputs: Arc<InputLayer>,
        interlock: Arc<SafetyInterlock>,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self, HalError> {
        hw.driver.write_output(OutputLine::DriverEnable, false)?;
        hw.driver.write_output(OutputLine::Step, false)?;

        Ok(Self {
            driver: Arc::clone(&hw.driver),
            clock: Arc::clone(&hw.clock),
            inputs,
            interlock,
            cancel,
            limits: FeedLimits::from_config(config),
            steps_per_mm: config.steps_per_mm(),
            max_stroke_mm: config.max_stroke_mm,
            axis: AxisState::default(),
        })
    }

    /// Energize the stepper driver.
    pub fn enable(&mut self) -> Result<(), HalError> {
        if !self.axis.enabled {
            self.driver.write_output(OutputLine::DriverEnable, true)?;
            self.axis.enabled = true;
            debug!("Axis driver enabled");
        }
        Ok(())
    }

    /// De-energize the stepper driver. Position is lost.
    ///
    /// The axis counts as disabled even if the write fails.
    pub fn disable(&mut self) -> Result<(), HalError> {
        let was_enabled = self.axis.enabled;
        self.axis = AxisState::default();
        self.driver.write_output(OutputLine::DriverEnable, false)?;
        if was_enabled {
            debug!("Axis driver disabled");
        }
        Ok(())
    }

    /// Current axis state.
    pub fn axis(&self) -> AxisState {
        self.axis
    }

    /// Configured resolution [steps/mm].
    pub fn steps_per_mm(&self) -> f64 {
        self.steps_per_mm
    }

    /// Configured feed range.
    pub fn feed_limits(&self) -> FeedLimits {
        self.limits
    }

    pub(crate) fn set_position_known(&mut self, known: bool) {
        self.axis.position_known = known && self.axis.enabled;
    }

    /// Move `distance_mm` (positive = up) at `feed_mm_s`, clamped.
    ///
    /// # Errors
    ///
    /// - `NotEnabled` if the driver is not energized (no pulse emitted)
    /// - `InvalidDistance` for NaN
    /// - `StrokeExceeded` above `motion.max_stroke_mm`
    /// - `Hal` if a line write fails mid-move
    pub fn move_mm(&mut self, distance_mm: f64, feed_mm_s: f64) -> Result<MoveReport, MotionError> {
        if !self.axis.enabled {
            return Err(MotionError::NotEnabled);
        }
        if distance_mm.is_nan() {
            return Err(MotionError::InvalidDistance(distance_mm));
        }
        if distance_mm.abs() > self.max_stroke_mm {
            return Err(MotionError::StrokeExceeded {
                requested_mm: distance_mm.abs(),
                limit_mm: self.max_stroke_mm,
            });
        }

        match PulsePlan::for_move(distance_mm, feed_mm_s, self.steps_per_mm, &self.limits) {
            Some(plan) => {
                debug!(
                    "Move {distance_mm:+.4} mm at {:.3} mm/s: {} pulses, half-period {:?}",
                    self.limits.clamp(feed_mm_s),
                    plan.pulse_count,
                    plan.half_period
                );
                self.execute(&plan)
            }
            None => Ok(MoveReport::noop()),
        }
    }

    /// Emit a prepared pulse plan. The plan is not checked against the
    /// stroke ceiling, so callers bound `pulse_count` themselves.
    ///
    /// # Errors
    ///
    /// `NotEnabled` if the driver is not energized; `Hal` on a failed write,
    /// carrying the pulses already emitted.
    pub(crate) fn execute(&mut self, plan: &PulsePlan) -> Result<MoveReport, MotionError> {
        if !self.axis.enabled {
            return Err(MotionError::NotEnabled);
        }

        self.driver
            .write_output(OutputLine::Direction, plan.direction.dir_level())?;

        let facing = plan.direction.facing_limit();
        let mut completed = 0u64;
        let mut end = MoveEnd::Completed;

        while completed < plan.pulse_count {
            if let Some(stop) = self.check_before_pulse(facing) {
                end = stop;
                break;
            }
            self.driver
                .write_output(OutputLine::Step, true)
                .map_err(|source| MotionError::Hal { source, completed })?;
            // The rising edge moved the motor.
            completed += 1;
            self.clock.sleep(plan.half_period);
            self.driver
                .write_output(OutputLine::Step, false)
                .map_err(|source| MotionError::Hal { source, completed })?;
            self.clock.sleep(plan.half_period);
        }

        let report = MoveReport {
            direction: Some(plan.direction),
            requested: plan.pulse_count,
            completed,
            end,
            half_period: plan.half_period,
        };
        if report.is_short() {
            info!(
                "Move {} ended short: {completed}/{} pulses ({:?})",
                plan.direction, plan.pulse_count, end
            );
        } else {
            trace!("Move {} completed: {completed} pulses", plan.direction);
        }
        Ok(report)
    }

    /// Pulse-granular checks; both limits are sampled to keep their
    /// debounce state current.
    fn check_before_pulse(&self, facing: Switch) -> Option<MoveEnd> {
        let top = self.inputs.read(Switch::LimitTop);
        let bottom = self.inputs.read(Switch::LimitBottom);
        let facing_state = match facing {
            Switch::LimitTop => top,
            _ => bottom,
        };

        if facing_state.is_triggered() {
            return Some(MoveEnd::LimitReached(facing));
        }
        if !self.interlock.is_armed() {
            return Some(MoveEnd::Disarmed);
        }
        if self.cancel.load(Ordering::Acquire) {
            return Some(MoveEnd::Cancelled);
        }
        None
    }
}

impl std::fmt::Debug for StepGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepGenerator")
            .field("axis", &self.axis)
            .field("steps_per_mm", &self.steps_per_mm)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
