//! Shared rig builders and a write-recording driver wrapper.

use std::collections::HashSet;
use std::sync::Arc;

use ecm_common::hal::clock::Clock;
use ecm_common::hal::driver::{FlowCallback, HalError, RigDriver};
use ecm_common::rig::config::RigConfig;
use ecm_common::rig::types::{OutputLine, Switch};
use ecm_control_unit::Rig;
use ecm_control_unit::instrument::Instrumentation;
use ecm_hal::drivers::simulation::{SimClock, SimHandle, SimulationDriver};
use parking_lot::Mutex;

/// One observed driver write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Write {
    Output(OutputLine, bool),
    PumpDuty(f64),
}

/// Wraps the simulation driver, logging non-STEP writes and failing chosen lines.
pub struct RecordingDriver {
    inner: SimulationDriver,
    log: Arc<Mutex<Vec<Write>>>,
    failing: Arc<Mutex<HashSet<OutputLine>>>,
    pump_failing: Arc<Mutex<bool>>,
}

/// Test-side view of a [`RecordingDriver`].
#[derive(Clone)]
pub struct Recorder {
    log: Arc<Mutex<Vec<Write>>>,
    failing: Arc<Mutex<HashSet<OutputLine>>>,
    pump_failing: Arc<Mutex<bool>>,
}

impl Recorder {
    pub fn writes(&self) -> Vec<Write> {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    pub fn fail_line(&self, line: OutputLine) {
        self.failing.lock().insert(line);
    }

    pub fn fail_pump(&self) {
        *self.pump_failing.lock() = true;
    }
}

impl RecordingDriver {
    pub fn new(inner: SimulationDriver) -> (Self, Recorder) {
        let recorder = Recorder {
            log: Arc::default(),
            failing: Arc::default(),
            pump_failing: Arc::default(),
        };
        let driver = Self {
            inner,
            log: Arc::clone(&recorder.log),
            failing: Arc::clone(&recorder.failing),
            pump_failing: Arc::clone(&recorder.pump_failing),
        };
        (driver, recorder)
    }
}

impl RigDriver for RecordingDriver {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn version(&self) -> &'static str {
        "0.0.0"
    }

    fn init(&mut self, config: &RigConfig) -> Result<(), HalError> {
        self.inner.init(config)
    }

    fn read_switch(&self, switch: Switch) -> Result<bool, HalError> {
        self.inner.read_switch(switch)
    }

    fn write_output(&self, line: OutputLine, level: bool) -> Result<(), HalError> {
        if line != OutputLine::Step {
            self.log.lock().push(Write::Output(line, level));
        }
        if self.failing.lock().contains(&line) {
            return Err(HalError::CommunicationError(format!("{line} write failed")));
        }
        self.inner.write_output(line, level)
    }

    fn set_pump_duty(&self, percent: f64) -> Result<(), HalError> {
        self.log.lock().push(Write::PumpDuty(percent));
        if *self.pump_failing.lock() {
            return Err(HalError::CommunicationError("pwm write failed".into()));
        }
        self.inner.set_pump_duty(percent)
    }

    fn set_flow_callback(&self, callback: FlowCallback) -> Result<(), HalError> {
        self.inner.set_flow_callback(callback)
    }

    fn shutdown(&self) -> Result<(), HalError> {
        self.inner.shutdown()
    }
}

/// Default config with debounce off, so limit stops are pulse-exact.
pub fn exact_config() -> RigConfig {
    let mut config = RigConfig::default();
    config.inputs.debounce_ms = 0;
    config
}

/// Started rig on the simulation driver and a virtual clock.
pub fn sim_rig(config: RigConfig) -> (Rig, SimHandle, Arc<SimClock>) {
    let driver = SimulationDriver::new();
    let handle = driver.handle();
    let clock = Arc::new(SimClock::new());
    let rig = Rig::start(
        config,
        Box::new(driver),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Instrumentation::absent(),
    )
    .expect("rig start");
    (rig, handle, clock)
}

/// Started rig whose driver records every non-STEP write.
pub fn recorded_rig(config: RigConfig) -> (Rig, SimHandle, Recorder) {
    let sim = SimulationDriver::new();
    let handle = sim.handle();
    let (driver, recorder) = RecordingDriver::new(sim);
    let rig = Rig::start(
        config,
        Box::new(driver),
        Arc::new(SimClock::new()),
        Instrumentation::absent(),
    )
    .expect("rig start");
    (rig, handle, recorder)
}

/// Armed rig with the axis enabled.
pub fn ready_rig(config: RigConfig) -> (Rig, SimHandle, Arc<SimClock>) {
    let (mut rig, handle, clock) = sim_rig(config);
    assert!(rig.arm().unwrap().is_armed());
    rig.enable_axis().unwrap();
    (rig, handle, clock)
}
