//! Name → factory table for rig drivers.
//!
//! `[driver] name` in `rig.toml` (or `--driver`) selects one entry. The
//! factory returns an uninitialized driver: the rig calls `init` with the
//! full config so polarity, steps/mm and PWM frequency reach the hardware
//! before any line is driven. Built per process and passed by value.

use ecm_common::hal::driver::{DriverFactory, HalError, RigDriver};
use ecm_common::rig::config::RigConfig;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Registry of available rig drivers.
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a driver factory by name.
    pub fn get_factory(&self, name: &str) -> Option<DriverFactory> {
        self.factories.get(name).copied()
    }

    /// Create an uninitialized driver instance by name.
    ///
    /// # Errors
    /// Returns `HalError::DriverNotFound` if no driver with the given name is registered.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn RigDriver>, HalError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| HalError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// Create the driver named by `config.driver.name`.
    ///
    /// # Errors
    /// Returns `HalError::DriverNotFound` and logs the known names when the
    /// configured driver is not compiled in.
    pub fn create_for(&self, config: &RigConfig) -> Result<Box<dyn RigDriver>, HalError> {
        let name = config.driver.name.as_str();
        match self.create_driver(name) {
            Ok(driver) => {
                debug!("Driver '{name}' v{} selected", driver.version());
                Ok(driver)
            }
            Err(e) => {
                warn!("Driver '{name}' unknown; available: {:?}", self.list_drivers());
                Err(e)
            }
        }
    }

    /// List all registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
