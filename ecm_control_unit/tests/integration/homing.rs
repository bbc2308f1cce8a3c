//! Integration test: homing against the simulated axis.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use ecm_common::rig::types::{Direction, Switch};
use ecm_control_unit::homing::{HomingOutcome, HomingPhase};
use ecm_control_unit::motion::MoveEnd;
use ecm_hal::drivers::simulation::{SimAction, SimGeometry};
use parking_lot::Mutex;

use super::common::{exact_config, sim_rig};

const APPROACH_PHASES: [HomingPhase; 3] = [
    HomingPhase::Approaching,
    HomingPhase::Backoff,
    HomingPhase::SlowApproach,
];

#[test]
fn homes_on_top_limit() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    rig.arm().unwrap();

    let report = rig.home().unwrap();

    assert!(report.is_homed());
    assert_eq!(report.phase_sequence(), APPROACH_PHASES);
    let pulses: Vec<u64> = report.phases.iter().map(|p| p.pulses).collect();
    // 10 mm to the trip point, 0.5 mm back off, 0.5 mm back in.
    assert_eq!(pulses, vec![16_000, 800, 800]);
    assert_eq!(handle.position_steps(), 16_000);
    assert_eq!(handle.pulses_by_direction(), (16_800, 800));
    assert!(rig.axis().position_known);
    assert!(rig.axis().enabled);
    assert_eq!(rig.homing_phase(), HomingPhase::Homed);
    assert_eq!(handle.pulses_into_limit(), 0);
}

#[test]
fn homing_twice_repeats_the_phase_sequence() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    rig.arm().unwrap();

    let first = rig.home().unwrap();
    let second = rig.home().unwrap();

    assert!(first.is_homed() && second.is_homed());
    assert_eq!(first.phase_sequence(), second.phase_sequence());
    // Already on the limit: the fast approach emits nothing.
    assert_eq!(second.phases[0].pulses, 0);
    assert_eq!(second.phases[1].pulses, 800);
    assert_eq!(second.phases[2].pulses, 800);
    assert_eq!(handle.position_steps(), 16_000);
}

#[test]
fn starting_on_the_limit_skips_the_fast_approach() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    handle.set_geometry(SimGeometry {
        start_mm: 10.0,
        ..Default::default()
    });
    rig.arm().unwrap();

    let report = rig.home().unwrap();

    assert!(report.is_homed());
    assert_eq!(report.phases[0].pulses, 0);
    assert_eq!(
        report.phases[0].end,
        MoveEnd::LimitReached(Switch::LimitTop)
    );
}

#[test]
fn homes_downward_on_bottom_limit() {
    let mut config = exact_config();
    config.homing.direction = Direction::Down;
    let (mut rig, handle, _clock) = sim_rig(config);
    handle.set_geometry(SimGeometry {
        start_mm: -58.0,
        ..Default::default()
    });
    rig.arm().unwrap();

    let report = rig.home().unwrap();

    assert!(report.is_homed());
    assert_eq!(report.phases[0].pulses, 3_200);
    assert_eq!(
        report.phases[2].end,
        MoveEnd::LimitReached(Switch::LimitBottom)
    );
    assert_eq!(handle.position_steps(), -96_000);
}

#[test]
fn homes_with_switch_debounce() {
    let (mut rig, handle, _clock) = sim_rig(Default::default());
    rig.arm().unwrap();

    let report = rig.home().unwrap();

    assert!(report.is_homed());
    assert_eq!(report.phase_sequence(), APPROACH_PHASES);
    // Debounce lets the carriage overtravel the trip point a little.
    assert!(report.phases[0].pulses > 16_000);
    assert!(report.phases[2].pulses > 0);
    assert!(handle.is_triggered(Switch::LimitTop));
}

#[test]
fn missing_limit_is_reported_after_the_ceiling() {
    let mut config = exact_config();
    config.homing.max_travel_mm = 20.0;
    let (mut rig, handle, _clock) = sim_rig(config);
    handle.set_geometry(SimGeometry {
        top_limit_mm: None,
        ..Default::default()
    });
    rig.arm().unwrap();

    let report = rig.home().unwrap();

    assert_eq!(
        report.outcome,
        HomingOutcome::LimitNotFound {
            phase: HomingPhase::Approaching
        }
    );
    assert_eq!(report.phases[0].pulses, 32_000);
    assert_eq!(handle.pulses(), 32_000);
    assert!(!rig.axis().position_known);
    assert_eq!(rig.homing_phase(), HomingPhase::Aborted);
}

#[test]
fn estop_during_approach_aborts_homing() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    rig.arm().unwrap();

    let watch = Mutex::new(rig.safety_watch());
    let press = handle.clone();
    handle.schedule(
        2_000,
        SimAction::Call(Arc::new(move || {
            press.press(Switch::Estop);
            watch.lock().poll();
        })),
    );

    let report = rig.home().unwrap();

    assert_eq!(
        report.outcome,
        HomingOutcome::Aborted {
            phase: HomingPhase::Approaching,
            end: MoveEnd::Disarmed
        }
    );
    assert_eq!(report.total_pulses(), 2_000);
    assert!(!rig.axis().position_known);
    assert!(!handle.relay());
    assert_eq!(handle.pulses_while_deenergized(), 0);
    assert!(!rig.arm().unwrap().is_armed());
}

#[test]
fn estop_during_backoff_aborts_homing() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    rig.arm().unwrap();

    let watch = Mutex::new(rig.safety_watch());
    let press = handle.clone();
    handle.schedule(
        16_400,
        SimAction::Call(Arc::new(move || {
            press.press(Switch::Estop);
            watch.lock().poll();
        })),
    );

    let report = rig.home().unwrap();

    assert_eq!(
        report.outcome,
        HomingOutcome::Aborted {
            phase: HomingPhase::Backoff,
            end: MoveEnd::Disarmed
        }
    );
    assert_eq!(report.phases[1].pulses, 400);
    assert!(!rig.axis().position_known);
}

#[test]
fn cancel_aborts_and_rehoming_succeeds() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    rig.arm().unwrap();
    let cancel = rig.cancel_flag();
    let flag = Arc::clone(&cancel);
    handle.schedule(
        5_000,
        SimAction::Call(Arc::new(move || flag.store(true, Ordering::Release))),
    );

    let aborted = rig.home().unwrap();
    assert_eq!(
        aborted.outcome,
        HomingOutcome::Aborted {
            phase: HomingPhase::Approaching,
            end: MoveEnd::Cancelled
        }
    );
    assert_eq!(rig.homing_phase(), HomingPhase::Aborted);

    cancel.store(false, Ordering::Release);
    let report = rig.home().unwrap();
    assert!(report.is_homed());
    assert_eq!(report.phases[0].pulses, 11_000);
}

#[test]
fn disabling_the_axis_forgets_home() {
    let (mut rig, _handle, _clock) = sim_rig(exact_config());
    rig.arm().unwrap();
    assert!(rig.home().unwrap().is_homed());

    rig.disable_axis().unwrap();
    assert!(!rig.axis().position_known);
}

#[test]
fn homing_without_arming_aborts_immediately() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());

    let report = rig.home().unwrap();

    assert_eq!(
        report.outcome,
        HomingOutcome::Aborted {
            phase: HomingPhase::Approaching,
            end: MoveEnd::Disarmed
        }
    );
    assert_eq!(handle.pulses(), 0);
}
