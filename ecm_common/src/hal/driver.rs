//! HAL driver trait and error types.
//!
//! This module defines:
//! - `RigDriver` trait - Interface for pluggable rig I/O backends
//! - `HalError` enum - Error types for HAL operations
//! - `DriverFactory` type alias - Factory function type
//! - `FlowCallback` type alias - Flow sensor pulse notification

use crate::rig::config::RigConfig;
use crate::rig::types::{OutputLine, Switch};
use std::sync::Arc;
use thiserror::Error;

/// Error types for HAL operations.
#[derive(Debug, Clone, Error)]
pub enum HalError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// A digital line or PWM channel could not be configured or accessed
    #[error("Line unavailable: {0}")]
    LineUnavailable(String),

    /// Hardware communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Feature not provided by this backend
    #[error("Not supported by driver: {0}")]
    Unsupported(String),
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn RigDriver>;

/// Callback invoked once per flow sensor pulse, from the driver's context.
pub type FlowCallback = Arc<dyn Fn() + Send + Sync>;

/// Trait defining the interface for rig I/O drivers.
///
/// A single driver instance is shared (`Arc<dyn RigDriver>`) between the
/// control thread and the E-STOP monitor, so all I/O methods take `&self`
/// and backends use interior mutability.
///
/// # Lifecycle
///
/// 1. `init()` - Called once before any I/O; configures every line
/// 2. `read_switch()` / `write_output()` / `set_pump_duty()` - At runtime
/// 3. `shutdown()` - Called when the rig is torn down
///
/// # Levels
///
/// `read_switch` returns the raw electrical level (`true` = HIGH); polarity
/// is applied by the control unit. `write_output` takes logical levels; any
/// electrical inversion (e.g. active-low ENABLE) is the driver's concern.
pub trait RigDriver: Send + Sync {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Configure every line and the pump PWM channel.
    ///
    /// Outputs must come up in their safe state: STEP low, driver disabled,
    /// relay de-energized, pump duty 0.
    ///
    /// # Errors
    /// Return `HalError::InitFailed` or `HalError::LineUnavailable` if any
    /// line cannot be configured. The rig must not proceed to motion.
    fn init(&mut self, config: &RigConfig) -> Result<(), HalError>;

    /// Read the raw level of a switch input.
    fn read_switch(&self, switch: Switch) -> Result<bool, HalError>;

    /// Drive a digital output to a logical level.
    fn write_output(&self, line: OutputLine, level: bool) -> Result<(), HalError>;

    /// Set pump PWM duty [0..=100 %]. Callers clamp before calling.
    fn set_pump_duty(&self, percent: f64) -> Result<(), HalError>;

    /// Register the flow sensor pulse callback.
    ///
    /// Default: `HalError::Unsupported` (no flow sensor input).
    fn set_flow_callback(&self, _callback: FlowCallback) -> Result<(), HalError> {
        Err(HalError::Unsupported("flow sensor input".to_string()))
    }

    /// Graceful shutdown of the driver.
    fn shutdown(&self) -> Result<(), HalError>;
}
