//! Simulation driver implementation.
//!
//! `SimulationDriver` implements `RigDriver` on top of an [`AxisSimulator`].
//! A cloneable [`SimHandle`] shares the same state so tests and the bench
//! binary can press switches, script events at a given pulse index and
//! inspect what the control unit drove.

use super::axis::{AxisSimulator, SimGeometry};
use ecm_common::hal::driver::{FlowCallback, HalError, RigDriver};
use ecm_common::rig::config::RigConfig;
use ecm_common::rig::types::{Direction, OutputLine, Polarity, Switch};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Action applied when the pulse counter reaches a scripted index.
#[derive(Clone)]
pub enum SimAction {
    /// Force a switch to read as triggered.
    Press(Switch),
    /// Remove a forced switch state.
    Release(Switch),
    /// Run a callback after the pulse, outside the driver lock.
    Call(Arc<dyn Fn() + Send + Sync>),
}

impl std::fmt::Debug for SimAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Press(sw) => write!(f, "Press({sw})"),
            Self::Release(sw) => write!(f, "Release({sw})"),
            Self::Call(_) => write!(f, "Call(..)"),
        }
    }
}

#[derive(Debug)]
struct ScriptedAction {
    at_pulse: u64,
    action: SimAction,
}

/// Mutable simulation state.
struct SimState {
    initialized: bool,
    polarity: [Polarity; 3],
    axis: AxisSimulator,
    overrides: [Option<bool>; 3],
    unavailable: HashSet<Switch>,
    step_level: bool,
    direction: Direction,
    enabled: bool,
    relay: bool,
    pump_duty: f64,
    pwm_hz: u32,
    pulses: u64,
    pulses_up: u64,
    pulses_down: u64,
    pulses_while_disabled: u64,
    pulses_while_deenergized: u64,
    pulses_into_limit: u64,
    relay_on_writes: u64,
    script: Vec<ScriptedAction>,
}

impl SimState {
    fn new() -> Self {
        Self {
            initialized: false,
            polarity: [Polarity::ActiveLow; 3],
            axis: AxisSimulator::new(1600.0, SimGeometry::default()),
            overrides: [None; 3],
            unavailable: HashSet::new(),
            step_level: false,
            direction: Direction::Down,
            enabled: false,
            relay: false,
            pump_duty: 0.0,
            pwm_hz: 0,
            pulses: 0,
            pulses_up: 0,
            pulses_down: 0,
            pulses_while_disabled: 0,
            pulses_while_deenergized: 0,
            pulses_into_limit: 0,
            relay_on_writes: 0,
            script: Vec::new(),
        }
    }

    fn triggered(&self, switch: Switch) -> bool {
        self.overrides[switch.index()].unwrap_or_else(|| self.axis.limit_tripped(switch))
    }

    /// Account one STEP rising edge; returns callbacks due at this pulse.
    fn on_pulse(&mut self) -> Vec<Arc<dyn Fn() + Send + Sync>> {
        if !self.enabled {
            self.pulses_while_disabled += 1;
        }
        if !self.relay {
            self.pulses_while_deenergized += 1;
        }
        if self.triggered(self.direction.facing_limit()) {
            self.pulses_into_limit += 1;
        }

        self.axis.step(self.direction);
        self.pulses += 1;
        match self.direction {
            Direction::Up => self.pulses_up += 1,
            Direction::Down => self.pulses_down += 1,
        }

        let now = self.pulses;
        let mut callbacks = Vec::new();
        let mut remaining = Vec::with_capacity(self.script.len());
        for scripted in self.script.drain(..) {
            if scripted.at_pulse != now {
                remaining.push(scripted);
                continue;
            }
            debug!(pulse = now, action = ?scripted.action, "sim scripted action");
            match scripted.action {
                SimAction::Press(sw) => self.overrides[sw.index()] = Some(true),
                SimAction::Release(sw) => self.overrides[sw.index()] = None,
                SimAction::Call(cb) => callbacks.push(cb),
            }
        }
        self.script = remaining;
        callbacks
    }
}

/// State shared by the driver and its handles.
struct SimShared {
    state: Mutex<SimState>,
    flow_callback: Mutex<Option<FlowCallback>>,
}

/// Simulation driver implementing the `RigDriver` trait.
pub struct SimulationDriver {
    name: &'static str,
    version: &'static str,
    shared: Arc<SimShared>,
}

impl SimulationDriver {
    /// Create a new simulation driver instance.
    pub fn new() -> Self {
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            shared: Arc::new(SimShared {
                state: Mutex::new(SimState::new()),
                flow_callback: Mutex::new(None),
            }),
        }
    }

    /// Handle sharing this driver's state.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RigDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, config: &RigConfig) -> Result<(), HalError> {
        let mut st = self.shared.state.lock();

        if let Some(sw) = Switch::ALL.iter().find(|sw| st.unavailable.contains(*sw)) {
            return Err(HalError::InitFailed(format!("cannot configure input {sw}")));
        }

        for sw in Switch::ALL {
            st.polarity[sw.index()] = config.inputs.polarity(sw);
        }
        st.axis = st.axis.rescaled(config.motion.steps_per_mm());
        st.pwm_hz = config.pump.pwm_hz;
        st.step_level = false;
        st.enabled = false;
        st.relay = false;
        st.pump_duty = 0.0;
        st.initialized = true;

        info!(
            "Simulation driver initialized: {:.0} steps/mm, pwm {} Hz, axis at {:.3} mm",
            config.motion.steps_per_mm(),
            st.pwm_hz,
            st.axis.position_mm()
        );
        Ok(())
    }

    fn read_switch(&self, switch: Switch) -> Result<bool, HalError> {
        let st = self.shared.state.lock();
        if st.unavailable.contains(&switch) {
            return Err(HalError::LineUnavailable(switch.to_string()));
        }
        let triggered = st.triggered(switch);
        Ok(st.polarity[switch.index()].raw_level(triggered))
    }

    fn write_output(&self, line: OutputLine, level: bool) -> Result<(), HalError> {
        let callbacks = {
            let mut st = self.shared.state.lock();
            if !st.initialized {
                return Err(HalError::LineUnavailable(format!("{line} (driver not initialized)")));
            }
            match line {
                OutputLine::Step => {
                    let rising = level && !st.step_level;
                    st.step_level = level;
                    if rising { st.on_pulse() } else { Vec::new() }
                }
                OutputLine::Direction => {
                    st.direction = if level { Direction::Up } else { Direction::Down };
                    Vec::new()
                }
                OutputLine::DriverEnable => {
                    st.enabled = level;
                    Vec::new()
                }
                OutputLine::Relay => {
                    if level {
                        st.relay_on_writes += 1;
                    }
                    st.relay = level;
                    Vec::new()
                }
            }
        };

        for cb in callbacks {
            cb();
        }
        Ok(())
    }

    fn set_pump_duty(&self, percent: f64) -> Result<(), HalError> {
        let mut st = self.shared.state.lock();
        if !st.initialized {
            return Err(HalError::LineUnavailable("pump pwm (driver not initialized)".to_string()));
        }
        st.pump_duty = percent;
        Ok(())
    }

    fn set_flow_callback(&self, callback: FlowCallback) -> Result<(), HalError> {
        *self.shared.flow_callback.lock() = Some(callback);
        Ok(())
    }

    fn shutdown(&self) -> Result<(), HalError> {
        let mut st = self.shared.state.lock();
        st.step_level = false;
        st.enabled = false;
        st.relay = false;
        st.pump_duty = 0.0;
        st.initialized = false;
        let pulses = st.pulses;
        drop(st);
        // Edge interrupt released; a later init needs a new registration.
        *self.shared.flow_callback.lock() = None;
        info!("Simulation driver shut down after {pulses} pulses");
        Ok(())
    }
}

/// Test and bench access to a running simulation.
#[derive(Clone)]
pub struct SimHandle {
    shared: Arc<SimShared>,
}

impl SimHandle {
    /// Replace the axis geometry; the carriage returns to `start_mm`.
    pub fn set_geometry(&self, geometry: SimGeometry) {
        let mut st = self.shared.state.lock();
        let steps_per_mm = st.axis.steps_per_mm();
        st.axis = AxisSimulator::new(steps_per_mm, geometry);
    }

    /// Force a switch to read as triggered.
    pub fn press(&self, switch: Switch) {
        self.shared.state.lock().overrides[switch.index()] = Some(true);
    }

    /// Force a switch to read as clear (overrides geometry).
    pub fn hold_clear(&self, switch: Switch) {
        self.shared.state.lock().overrides[switch.index()] = Some(false);
    }

    /// Remove any forced state; limits follow the geometry again.
    pub fn release(&self, switch: Switch) {
        self.shared.state.lock().overrides[switch.index()] = None;
    }

    /// Make a switch input fail to configure and to read.
    pub fn set_unavailable(&self, switch: Switch, unavailable: bool) {
        let mut st = self.shared.state.lock();
        if unavailable {
            st.unavailable.insert(switch);
        } else {
            st.unavailable.remove(&switch);
        }
    }

    /// Apply `action` right after the `at_pulse`-th pulse (1-based, counted
    /// from driver creation).
    pub fn schedule(&self, at_pulse: u64, action: SimAction) {
        self.shared
            .state
            .lock()
            .script
            .push(ScriptedAction { at_pulse, action });
    }

    /// Deliver `count` flow sensor pulses to the registered callback.
    ///
    /// Returns `false` if the driver is not initialized or no callback is
    /// registered.
    pub fn emit_flow_pulses(&self, count: u32) -> bool {
        if !self.shared.state.lock().initialized {
            return false;
        }
        let Some(cb) = self.shared.flow_callback.lock().clone() else {
            return false;
        };
        for _ in 0..count {
            cb();
        }
        true
    }

    /// Total STEP rising edges.
    pub fn pulses(&self) -> u64 {
        self.shared.state.lock().pulses
    }

    /// Rising edges with DIR = up / down.
    pub fn pulses_by_direction(&self) -> (u64, u64) {
        let st = self.shared.state.lock();
        (st.pulses_up, st.pulses_down)
    }

    /// Pulses emitted while the driver was disabled.
    pub fn pulses_while_disabled(&self) -> u64 {
        self.shared.state.lock().pulses_while_disabled
    }

    /// Pulses emitted while the relay was de-energized.
    pub fn pulses_while_deenergized(&self) -> u64 {
        self.shared.state.lock().pulses_while_deenergized
    }

    /// Pulses emitted while the limit facing the travel was triggered.
    pub fn pulses_into_limit(&self) -> u64 {
        self.shared.state.lock().pulses_into_limit
    }

    /// Carriage position [microsteps].
    pub fn position_steps(&self) -> i64 {
        self.shared.state.lock().axis.position_steps()
    }

    /// Carriage position [mm].
    pub fn position_mm(&self) -> f64 {
        self.shared.state.lock().axis.position_mm()
    }

    /// Whether a switch currently reads as triggered (before polarity).
    pub fn is_triggered(&self, switch: Switch) -> bool {
        self.shared.state.lock().triggered(switch)
    }

    /// Relay coil state.
    pub fn relay(&self) -> bool {
        self.shared.state.lock().relay
    }

    /// Number of writes that energized the relay.
    pub fn relay_on_writes(&self) -> u64 {
        self.shared.state.lock().relay_on_writes
    }

    /// Driver enable state (logical).
    pub fn enabled(&self) -> bool {
        self.shared.state.lock().enabled
    }

    /// Current DIR level as a direction.
    pub fn direction(&self) -> Direction {
        self.shared.state.lock().direction
    }

    /// Pump PWM duty [%].
    pub fn pump_duty(&self) -> f64 {
        self.shared.state.lock().pump_duty
    }

    /// Configured PWM carrier [Hz].
    pub fn pwm_hz(&self) -> u32 {
        self.shared.state.lock().pwm_hz
    }
}
