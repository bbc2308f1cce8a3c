//! Rig driver implementations.
//!
//! - [`simulation`] - Software rig for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `RigDriver` trait from `ecm_common::hal::driver`
//! 3. Register the factory in [`builtin_registry`]

pub mod simulation;

use crate::driver_registry::DriverRegistry;

/// Registry pre-populated with every built-in driver.
pub fn builtin_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register("simulation", simulation::create_driver);
    registry
}
