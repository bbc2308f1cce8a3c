//! Electrolyte pump duty control.
//!
//! The pump runs from the relay-switched branch, so it only ever receives
//! a non-zero PWM duty while the interlock is armed. A duty requested while
//! disarmed is remembered but the PWM stays at 0; re-arming does not
//! restart the pump until the duty is set again.

pub mod flow;

use std::sync::Arc;

use ecm_common::hal::driver::{HalError, RigDriver};
use ecm_common::rig::config::PumpConfig;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::hardware::HardwareContext;
use crate::safety::SafetyInterlock;

pub use flow::{FlowMeter, FlowWindow};

/// What a duty request actually did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PumpCommand {
    /// Requested duty after clamping [%].
    pub requested: f64,
    /// Duty written to the PWM [%].
    pub applied: f64,
}

/// Pump PWM controller with optional flow meter.
pub struct PumpController {
    driver: Arc<dyn RigDriver>,
    interlock: Arc<SafetyInterlock>,
    run_duty: f64,
    state: Mutex<PumpCommand>,
    flow: Option<Arc<FlowMeter>>,
}

impl PumpController {
    /// Drive the PWM to 0 and hook up the flow sensor when calibrated.
    ///
    /// # Errors
    ///
    /// Fails if the PWM channel cannot be written.
    pub fn new(
        hw: &HardwareContext,
        config: &PumpConfig,
        interlock: Arc<SafetyInterlock>,
    ) -> Result<Self, HalError> {
        hw.driver.set_pump_duty(0.0)?;

        let flow = match config.flow_pulses_per_liter {
            Some(ppl) if ppl > 0.0 => {
                let meter = Arc::new(FlowMeter::new(
                    Arc::clone(&hw.clock),
                    ppl,
                    config.flow_lookback(),
                ));
                let sink = Arc::clone(&meter);
                match hw.driver.set_flow_callback(Arc::new(move || sink.record_pulse())) {
                    Ok(()) => {
                        info!("Flow sensor attached: {ppl} pulses/L");
                        Some(meter)
                    }
                    Err(e) => {
                        warn!("Flow sensor unavailable ({e}), flow reads 0");
                        None
                    }
                }
            }
            Some(ppl) => {
                warn!("Ignoring flow calibration {ppl} pulses/L, flow reads 0");
                None
            }
            None => None,
        };

        Ok(Self {
            driver: Arc::clone(&hw.driver),
            interlock,
            run_duty: config.run_duty,
            state: Mutex::new(PumpCommand {
                requested: 0.0,
                applied: 0.0,
            }),
            flow,
        })
    }

    /// Set duty, clamped to 0..=100 %. NaN is treated as 0.
    ///
    /// # Errors
    ///
    /// Returns the PWM write error; the recorded state is left unchanged.
    pub fn try_set_duty(&self, percent: f64) -> Result<PumpCommand, HalError> {
        let requested = clamp_duty(percent);

        // Armed check under the lock: an E-STOP disarms before calling
        // `off()`, so a duty write can never land after that 0.
        let mut state = self.state.lock();
        let applied = if self.interlock.is_armed() {
            requested
        } else {
            if requested > 0.0 {
                warn!("Pump duty {requested:.0}% held at 0: rig not armed");
            }
            0.0
        };

        self.driver.set_pump_duty(applied)?;
        let cmd = PumpCommand { requested, applied };
        if *state != cmd {
            debug!("Pump duty {applied:.0}% (requested {requested:.0}%)");
        }
        *state = cmd;
        Ok(cmd)
    }

    /// Set duty; a PWM write failure is logged and reported as 0 applied.
    pub fn set_duty(&self, percent: f64) -> PumpCommand {
        self.try_set_duty(percent).unwrap_or_else(|e| {
            warn!("Pump duty write failed: {e}");
            PumpCommand {
                requested: clamp_duty(percent),
                applied: 0.0,
            }
        })
    }

    /// Run at the configured duty.
    pub fn on(&self) -> PumpCommand {
        self.set_duty(self.run_duty)
    }

    /// Stop the pump.
    pub fn off(&self) -> PumpCommand {
        self.set_duty(0.0)
    }

    /// Last applied duty [%].
    pub fn duty(&self) -> f64 {
        self.state.lock().applied
    }

    /// Last command.
    pub fn command(&self) -> PumpCommand {
        *self.state.lock()
    }

    /// Estimated flow [L/min]; 0 without a flow sensor.
    pub fn flow_rate(&self) -> f64 {
        self.flow.as_ref().map_or(0.0, |meter| meter.rate_lpm())
    }

    /// Whether a flow sensor is attached.
    pub fn has_flow_sensor(&self) -> bool {
        self.flow.is_some()
    }
}

fn clamp_duty(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

impl std::fmt::Debug for PumpController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpController")
            .field("command", &self.command())
            .field("run_duty", &self.run_duty)
            .field("flow", &self.flow)
            .finish_non_exhaustive()
    }
}
