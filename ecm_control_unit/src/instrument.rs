//! Power instrumentation snapshot.
//!
//! Two INA219-style channels: the ECM process loop (always expected) and the
//! pump branch (optional). Reads never fail upward: a failed channel reports
//! zeros and marks the snapshot degraded, so logging keeps going and the
//! power-cut detector ignores it.

use std::sync::Arc;

use ecm_common::hal::sensor::PowerSensor;
use ecm_common::rig::types::{ChannelReading, PowerSnapshot};
use tracing::warn;

/// Power sensor channels of the rig.
#[derive(Clone, Default)]
pub struct Instrumentation {
    ecm: Option<Arc<dyn PowerSensor>>,
    pump: Option<Arc<dyn PowerSensor>>,
}

impl Instrumentation {
    /// Instrumentation with an ECM channel and an optional pump channel.
    pub fn new(ecm: Arc<dyn PowerSensor>, pump: Option<Arc<dyn PowerSensor>>) -> Self {
        Self {
            ecm: Some(ecm),
            pump,
        }
    }

    /// No sensors fitted; every snapshot is degraded.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Whether an ECM channel is fitted.
    pub fn has_ecm(&self) -> bool {
        self.ecm.is_some()
    }

    /// Read every channel.
    pub fn snapshot(&self) -> PowerSnapshot {
        let mut notes = Vec::new();

        let ecm = match &self.ecm {
            Some(sensor) => read_channel(sensor.as_ref(), &mut notes),
            None => {
                notes.push("ecm: no sensor".to_string());
                ChannelReading::default()
            }
        };
        let ecm_fault = !notes.is_empty();
        let pump = self
            .pump
            .as_ref()
            .map(|sensor| read_channel(sensor.as_ref(), &mut notes));

        PowerSnapshot {
            ecm,
            pump,
            degraded: !notes.is_empty(),
            ecm_fault,
            note: (!notes.is_empty()).then(|| notes.join("; ")),
        }
    }
}

fn read_channel(sensor: &dyn PowerSensor, notes: &mut Vec<String>) -> ChannelReading {
    match sensor.read() {
        Ok(reading) => reading,
        Err(e) => {
            warn!("Power sensor {} read failed: {e}", sensor.label());
            notes.push(format!("{}: {e}", sensor.label()));
            ChannelReading::default()
        }
    }
}

impl std::fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumentation")
            .field("ecm", &self.ecm.as_ref().map(|s| s.label().to_string()))
            .field("pump", &self.pump.as_ref().map(|s| s.label().to_string()))
            .finish()
    }
}
