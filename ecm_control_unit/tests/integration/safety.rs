//! Integration test: E-STOP, interlock, power cut and shutdown ordering.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ecm_common::hal::clock::Clock;
use ecm_common::hal::sensor::PowerSensor;
use ecm_common::rig::config::RigConfig;
use ecm_common::rig::types::{OutputLine, Switch};
use ecm_control_unit::instrument::Instrumentation;
use ecm_control_unit::rig::ShutdownStep;
use ecm_control_unit::safety::{EstopTransition, PowerVerdict};
use ecm_control_unit::{Rig, RigError};
use ecm_hal::drivers::simulation::{SimClock, SimHandle, SimPowerSensor, SimulationDriver};
use proptest::prelude::*;

use super::common::{Write, exact_config, recorded_rig, sim_rig};

// ── E-STOP ──────────────────────────────────────────────────────────

#[test]
fn estop_press_drops_relay_and_refuses_arm() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    assert!(rig.arm().unwrap().is_armed());
    rig.set_pump_duty(60.0);

    handle.press(Switch::Estop);
    let poll = rig.poll_safety();

    assert_eq!(poll.transition, EstopTransition::Pressed);
    assert!(!handle.relay());
    assert_eq!(handle.pump_duty(), 0.0);
    assert!(!rig.arm().unwrap().is_armed());
    assert_eq!(handle.relay_on_writes(), 1);
}

#[test]
fn release_requires_explicit_rearm_and_pump_stays_off() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    rig.arm().unwrap();
    rig.pump_on();

    handle.press(Switch::Estop);
    rig.poll_safety();
    handle.release(Switch::Estop);
    assert_eq!(rig.poll_safety().transition, EstopTransition::Released);

    assert!(!handle.relay());
    assert!(rig.arm().unwrap().is_armed());
    assert!(handle.relay());
    assert_eq!(handle.pump_duty(), 0.0);
}

#[test]
fn monitor_thread_drops_relay() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    rig.arm().unwrap();
    rig.start_monitor().unwrap();
    assert!(rig.monitor_running());

    handle.press(Switch::Estop);
    let deadline = Instant::now() + Duration::from_millis(500);
    while handle.relay() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }

    assert!(!handle.relay());
    assert!(rig.interlock_state().estop_active);
    let report = rig.shutdown();
    assert!(report.is_clean());
    assert!(!rig.monitor_running());
}

#[test]
fn software_trip_survives_hardware_release() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    rig.arm().unwrap();

    assert_eq!(rig.trip("operator abort"), EstopTransition::Pressed);
    assert!(!handle.relay());

    handle.press(Switch::Estop);
    rig.poll_safety();
    handle.release(Switch::Estop);
    rig.poll_safety();
    assert!(!rig.arm().unwrap().is_armed());

    assert_eq!(rig.clear_trip(), EstopTransition::Released);
    assert!(rig.arm().unwrap().is_armed());
}

#[test]
fn wait_estop_clear_times_out_while_pressed() {
    let (rig, _handle, clock) = sim_rig(exact_config());
    rig.trip("test");
    assert!(!rig.wait_estop_clear(Duration::from_millis(100)));
    assert!(clock.now() >= Duration::from_millis(100));
    rig.clear_trip();
    assert!(rig.wait_estop_clear(Duration::from_millis(100)));
}

#[test]
fn unavailable_input_fails_startup() {
    let driver = SimulationDriver::new();
    driver.handle().set_unavailable(Switch::Estop, true);
    let result = Rig::start(
        exact_config(),
        Box::new(driver),
        Arc::new(SimClock::new()),
        Instrumentation::absent(),
    );
    assert!(matches!(result, Err(RigError::Hal(_))));
}

#[test]
fn runtime_read_failure_reads_as_pressed() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    rig.arm().unwrap();

    handle.set_unavailable(Switch::Estop, true);
    rig.poll_safety();

    assert!(!handle.relay());
    assert!(rig.interlock_state().estop_active);
}

// ── Power Cut ───────────────────────────────────────────────────────

fn powered_rig() -> (Rig, SimHandle, Arc<SimPowerSensor>) {
    powered_rig_with_pump(None)
}

fn powered_rig_with_pump(
    pump: Option<Arc<dyn PowerSensor>>,
) -> (Rig, SimHandle, Arc<SimPowerSensor>) {
    let mut config = exact_config();
    config.safety.power_cut_bus_v = Some(4.0);
    config.safety.power_cut_samples = 3;
    let driver = SimulationDriver::new();
    let handle = driver.handle();
    let ecm = Arc::new(SimPowerSensor::powered("ecm", 12.0));
    let sensor: Arc<dyn PowerSensor> = ecm.clone();
    let rig = Rig::start(
        config,
        Box::new(driver),
        Arc::new(SimClock::new()),
        Instrumentation::new(sensor, pump),
    )
    .unwrap();
    (rig, handle, ecm)
}

#[test]
fn power_cut_disarms_after_consecutive_low_samples() {
    let (mut rig, handle, ecm) = powered_rig();
    rig.arm().unwrap();
    rig.pump_on();

    ecm.set_bus_voltage(0.3);
    assert_eq!(rig.poll_safety().power, Some(PowerVerdict::Low(1)));
    assert_eq!(rig.poll_safety().power, Some(PowerVerdict::Low(2)));
    assert!(handle.relay());
    assert_eq!(rig.poll_safety().power, Some(PowerVerdict::Cut));

    assert!(!handle.relay());
    assert_eq!(handle.pump_duty(), 0.0);
    // Not latched: re-arming is the operator's call.
    assert!(!rig.interlock_state().estop_active);
}

#[test]
fn power_dip_shorter_than_window_is_ignored() {
    let (mut rig, handle, ecm) = powered_rig();
    rig.arm().unwrap();

    ecm.set_bus_voltage(0.3);
    rig.poll_safety();
    rig.poll_safety();
    ecm.set_bus_voltage(12.0);
    assert_eq!(rig.poll_safety().power, Some(PowerVerdict::Present));
    ecm.set_bus_voltage(0.3);
    rig.poll_safety();
    rig.poll_safety();

    assert!(handle.relay());
}

#[test]
fn failing_sensor_never_trips_power_cut() {
    let (mut rig, handle, ecm) = powered_rig();
    rig.arm().unwrap();

    ecm.set_failing(true);
    for _ in 0..10 {
        assert_eq!(rig.poll_safety().power, Some(PowerVerdict::NoEvidence));
    }
    assert!(handle.relay());
    assert!(rig.snapshot().power.degraded);
}

#[test]
fn failing_pump_sensor_does_not_hide_ecm_power_cut() {
    let pump = Arc::new(SimPowerSensor::powered("pump", 12.0));
    pump.set_failing(true);
    let pump_sensor: Arc<dyn PowerSensor> = pump;
    let (mut rig, handle, ecm) = powered_rig_with_pump(Some(pump_sensor));
    rig.arm().unwrap();

    ecm.set_bus_voltage(0.0);
    let verdicts: Vec<_> = (0..3).map(|_| rig.poll_safety().power).collect();
    assert_eq!(
        verdicts,
        vec![
            Some(PowerVerdict::Low(1)),
            Some(PowerVerdict::Low(2)),
            Some(PowerVerdict::Cut),
        ]
    );
    assert!(!handle.relay());
    assert!(rig.snapshot().power.degraded);
}

#[test]
fn power_cut_is_not_evaluated_while_disarmed() {
    let (mut rig, _handle, ecm) = powered_rig();
    ecm.set_bus_voltage(0.0);
    for _ in 0..5 {
        assert_eq!(rig.poll_safety().power, None);
    }
}

// ── Shutdown ────────────────────────────────────────────────────────

#[test]
fn shutdown_writes_disable_then_pump_then_relay() {
    let (mut rig, _handle, recorder) = recorded_rig(exact_config());
    rig.arm().unwrap();
    rig.enable_axis().unwrap();
    rig.pump_on();
    recorder.clear();

    let report = rig.shutdown();

    assert!(report.is_clean());
    assert_eq!(
        recorder.writes(),
        vec![
            Write::Output(OutputLine::DriverEnable, false),
            Write::PumpDuty(0.0),
            Write::Output(OutputLine::Relay, false),
        ]
    );
}

#[test]
fn shutdown_continues_past_failed_steps() {
    let (mut rig, handle, recorder) = recorded_rig(exact_config());
    rig.arm().unwrap();
    rig.enable_axis().unwrap();
    recorder.fail_line(OutputLine::DriverEnable);
    recorder.fail_pump();

    let report = rig.shutdown();

    assert!(!report.is_clean());
    assert_eq!(
        report.order(),
        vec![
            ShutdownStep::DisableAxis,
            ShutdownStep::PumpOff,
            ShutdownStep::RelayOff,
            ShutdownStep::StopMonitor,
            ShutdownStep::DriverShutdown,
        ]
    );
    assert!(report.steps[0].error.is_some());
    assert!(report.steps[1].error.is_some());
    assert!(report.steps[2].error.is_none());
    assert!(!handle.relay());
}

#[test]
fn panic_unwind_still_shuts_down() {
    let driver = SimulationDriver::new();
    let handle = driver.handle();

    let result = panic::catch_unwind(AssertUnwindSafe(move || {
        let mut rig = Rig::start(
            RigConfig::default(),
            Box::new(driver),
            Arc::new(SimClock::new()),
            Instrumentation::absent(),
        )
        .unwrap();
        rig.arm().unwrap();
        rig.enable_axis().unwrap();
        rig.pump_on();
        panic!("operator code failed");
    }));

    assert!(result.is_err());
    assert!(!handle.relay());
    assert!(!handle.enabled());
    assert_eq!(handle.pump_duty(), 0.0);
}

// ── Interlock Precedence ────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Op {
    Press,
    Release,
    Poll,
    Arm,
    Disarm,
    Trip,
    ClearTrip,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Press),
        Just(Op::Release),
        Just(Op::Poll),
        Just(Op::Arm),
        Just(Op::Disarm),
        Just(Op::Trip),
        Just(Op::ClearTrip),
    ]
}

proptest! {
    #[test]
    fn relay_never_energized_while_estop_active(ops in prop::collection::vec(op(), 1..40)) {
        let (mut rig, handle, _clock) = sim_rig(exact_config());

        for op in ops {
            match op {
                Op::Press => handle.press(Switch::Estop),
                Op::Release => handle.release(Switch::Estop),
                Op::Poll => {
                    rig.poll_safety();
                }
                Op::Arm => {
                    let active = rig.interlock_state().estop_active;
                    let armed = rig.arm().unwrap().is_armed();
                    prop_assert!(!(active && armed));
                }
                Op::Disarm => rig.disarm().unwrap(),
                Op::Trip => {
                    rig.trip("proptest");
                }
                Op::ClearTrip => {
                    rig.clear_trip();
                }
            }
            let state = rig.interlock_state();
            prop_assert!(!(state.estop_active && state.relay_energized));
            prop_assert_eq!(handle.relay(), state.relay_energized);
        }
    }
}
