//! Current/voltage sensor channel interface.
//!
//! The INA219 driver itself is an external collaborator; the core only needs
//! a polled read that never blocks longer than the sensor's bus timeout.

use crate::hal::driver::HalError;
use crate::rig::types::ChannelReading;

/// One polled instrumentation channel.
pub trait PowerSensor: Send + Sync {
    /// Channel label used in logs ("ecm", "pump").
    fn label(&self) -> &str;

    /// Read bus voltage, shunt voltage, current and power.
    ///
    /// # Errors
    /// Returns `HalError::CommunicationError` when the bus read fails.
    fn read(&self) -> Result<ChannelReading, HalError>;
}
