//! Z-axis simulator.
//!
//! Open-loop stepper model: every STEP rising edge moves the carriage one
//! microstep in the DIR direction. Limit switches trip when the carriage is
//! at or beyond their trip position; there is no hard stop, so overtravel
//! past a trip point stays tripped.

use ecm_common::rig::types::{Direction, Switch};
use tracing::trace;

/// Axis geometry in millimetres, relative to the power-on position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimGeometry {
    /// Carriage position at power-on [mm].
    pub start_mm: f64,
    /// Top limit trip position [mm]; `None` = switch never trips.
    pub top_limit_mm: Option<f64>,
    /// Bottom limit trip position [mm]; `None` = switch never trips.
    pub bottom_limit_mm: Option<f64>,
}

impl Default for SimGeometry {
    fn default() -> Self {
        Self {
            start_mm: 0.0,
            top_limit_mm: Some(10.0),
            bottom_limit_mm: Some(-60.0),
        }
    }
}

/// Axis simulator tracking carriage position in microsteps.
#[derive(Debug, Clone)]
pub struct AxisSimulator {
    steps_per_mm: f64,
    geometry: SimGeometry,
    position_steps: i64,
    top_trip_steps: Option<i64>,
    bottom_trip_steps: Option<i64>,
}

impl AxisSimulator {
    /// Create an axis at `geometry.start_mm`.
    pub fn new(steps_per_mm: f64, geometry: SimGeometry) -> Self {
        let to_steps = |mm: f64| (mm * steps_per_mm).round() as i64;
        Self {
            steps_per_mm,
            geometry,
            position_steps: to_steps(geometry.start_mm),
            top_trip_steps: geometry.top_limit_mm.map(to_steps),
            bottom_trip_steps: geometry.bottom_limit_mm.map(to_steps),
        }
    }

    /// Rebuild with a new resolution, keeping the geometry.
    pub fn rescaled(&self, steps_per_mm: f64) -> Self {
        Self::new(steps_per_mm, self.geometry)
    }

    /// Advance one microstep.
    pub fn step(&mut self, direction: Direction) {
        self.position_steps += direction.sign();
        trace!(position_steps = self.position_steps, "sim axis step");
    }

    /// Resolution [microsteps/mm].
    #[inline]
    pub fn steps_per_mm(&self) -> f64 {
        self.steps_per_mm
    }

    /// Carriage position [microsteps].
    #[inline]
    pub fn position_steps(&self) -> i64 {
        self.position_steps
    }

    /// Carriage position [mm].
    pub fn position_mm(&self) -> f64 {
        self.position_steps as f64 / self.steps_per_mm
    }

    /// Whether a limit switch is geometrically tripped. E-STOP is never.
    pub fn limit_tripped(&self, switch: Switch) -> bool {
        match switch {
            Switch::LimitTop => self
                .top_trip_steps
                .is_some_and(|trip| self.position_steps >= trip),
            Switch::LimitBottom => self
                .bottom_trip_steps
                .is_some_and(|trip| self.position_steps <= trip),
            Switch::Estop => false,
        }
    }
}
