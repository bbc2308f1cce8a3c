//! Programmable power sensor channel.

use ecm_common::hal::driver::HalError;
use ecm_common::hal::sensor::PowerSensor;
use ecm_common::rig::types::ChannelReading;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Simulated INA219-style channel with a settable reading and fault flag.
#[derive(Debug)]
pub struct SimPowerSensor {
    label: String,
    reading: Mutex<ChannelReading>,
    failing: AtomicBool,
}

impl SimPowerSensor {
    /// Create a channel reporting `reading`.
    pub fn new(label: impl Into<String>, reading: ChannelReading) -> Self {
        Self {
            label: label.into(),
            reading: Mutex::new(reading),
            failing: AtomicBool::new(false),
        }
    }

    /// Create a channel reporting a healthy supply at `bus_voltage_v`.
    pub fn powered(label: impl Into<String>, bus_voltage_v: f64) -> Self {
        Self::new(
            label,
            ChannelReading {
                bus_voltage_v,
                ..Default::default()
            },
        )
    }

    /// Replace the reported values.
    pub fn set_reading(&self, reading: ChannelReading) {
        *self.reading.lock() = reading;
    }

    /// Change only the bus voltage.
    pub fn set_bus_voltage(&self, volts: f64) {
        self.reading.lock().bus_voltage_v = volts;
    }

    /// Make subsequent reads fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl PowerSensor for SimPowerSensor {
    fn label(&self) -> &str {
        &self.label
    }

    fn read(&self) -> Result<ChannelReading, HalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HalError::CommunicationError(format!(
                "{}: I2C read NACK",
                self.label
            )));
        }
        Ok(*self.reading.lock())
    }
}
