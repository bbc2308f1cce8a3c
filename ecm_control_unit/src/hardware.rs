//! Handles to the I/O backend shared by every component.

use ecm_common::hal::clock::Clock;
use ecm_common::hal::driver::RigDriver;
use std::sync::Arc;

/// Driver and clock, passed explicitly to each component at construction.
#[derive(Clone)]
pub struct HardwareContext {
    /// Initialized rig driver.
    pub driver: Arc<dyn RigDriver>,
    /// Time source for pulse timing and debouncing.
    pub clock: Arc<dyn Clock>,
}

impl HardwareContext {
    /// Bundle an initialized driver with a clock.
    pub fn new(driver: Arc<dyn RigDriver>, clock: Arc<dyn Clock>) -> Self {
        Self { driver, clock }
    }
}

impl std::fmt::Debug for HardwareContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareContext")
            .field("driver", &self.driver.name())
            .finish_non_exhaustive()
    }
}
