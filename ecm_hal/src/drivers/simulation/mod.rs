//! Simulation driver module.
//!
//! Software rig for development and testing without physical hardware:
//! a Z axis with limit trip points, switch overrides, pulse-indexed
//! scripted events, a virtual clock and programmable power sensors.

mod axis;
mod clock;
mod driver;
mod sensor;

pub use axis::{AxisSimulator, SimGeometry};
pub use clock::SimClock;
pub use driver::{SimAction, SimHandle, SimulationDriver};
pub use sensor::SimPowerSensor;

use ecm_common::hal::driver::RigDriver;

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn RigDriver> {
    Box::new(SimulationDriver::new())
}
