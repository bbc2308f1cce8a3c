//! Integration test: step generation against the simulated axis.

use std::sync::Arc;
use std::time::Duration;

use ecm_common::hal::clock::Clock;
use ecm_common::rig::types::{OutputLine, Switch};
use ecm_control_unit::MotionError;
use ecm_control_unit::motion::MoveEnd;
use ecm_control_unit::motion::feed::half_period;
use ecm_hal::drivers::simulation::{SimAction, SimGeometry};
use proptest::prelude::*;

use super::common::{exact_config, ready_rig, recorded_rig, sim_rig};

#[test]
fn three_mm_at_half_mm_per_second() {
    let (mut rig, handle, clock) = ready_rig(exact_config());
    let start = clock.now();

    let report = rig.move_mm(3.0, 0.5).unwrap();

    assert_eq!(report.requested, 4800);
    assert_eq!(report.completed, 4800);
    assert_eq!(report.end, MoveEnd::Completed);
    assert_eq!(report.half_period, Duration::from_nanos(625_000));
    assert_eq!(clock.now() - start, Duration::from_secs(6));
    assert_eq!(handle.pulses_by_direction(), (4800, 0));
    assert!((handle.position_mm() - 3.0).abs() < 1e-9);
}

#[test]
fn step_write_failure_reports_pulses_already_emitted() {
    let (mut rig, handle, recorder) = recorded_rig(exact_config());
    assert!(rig.arm().unwrap().is_armed());
    rig.enable_axis().unwrap();
    let fail = recorder.clone();
    handle.schedule(
        250,
        SimAction::Call(Arc::new(move || fail.fail_line(OutputLine::Step))),
    );

    let err = rig.move_mm(1.0, 1.0).unwrap_err();

    assert!(matches!(err, MotionError::Hal { completed: 250, .. }));
    assert_eq!(handle.pulses(), 250);
    assert!(err.to_string().contains("250 pulses"));
}

#[test]
fn feed_above_ceiling_is_clamped() {
    let (mut rig, _handle, _clock) = ready_rig(exact_config());
    let report = rig.move_mm(-1.0, 100.0).unwrap();
    assert_eq!(report.half_period, half_period(3.0, 1600.0));
    assert_eq!(report.completed, 1600);
}

#[test]
fn feed_below_floor_is_clamped() {
    let (mut rig, _handle, _clock) = ready_rig(exact_config());
    let report = rig.move_mm(-0.01, 0.0).unwrap();
    assert_eq!(report.half_period, half_period(0.05, 1600.0));
    assert_eq!(report.completed, 16);
}

#[test]
fn limit_pressed_after_1000_pulses_stops_at_1000() {
    let (mut rig, handle, _clock) = ready_rig(exact_config());
    handle.schedule(1000, SimAction::Press(Switch::LimitTop));

    let report = rig.move_mm(2.0, 2.0).unwrap();

    assert_eq!(report.completed, 1000);
    assert_eq!(report.end, MoveEnd::LimitReached(Switch::LimitTop));
    assert_eq!(handle.pulses(), 1000);
    assert_eq!(handle.pulses_into_limit(), 0);
}

#[test]
fn geometry_limit_stops_at_trip_point() {
    let (mut rig, handle, _clock) = ready_rig(exact_config());
    handle.set_geometry(SimGeometry {
        start_mm: 9.0,
        ..Default::default()
    });

    let report = rig.move_mm(5.0, 3.0).unwrap();

    assert_eq!(report.end, MoveEnd::LimitReached(Switch::LimitTop));
    assert_eq!(report.completed, 1600);
    assert_eq!(handle.pulses_into_limit(), 0);
    assert!(handle.is_triggered(Switch::LimitTop));
}

#[test]
fn moving_away_from_a_triggered_limit_is_allowed() {
    let (mut rig, handle, _clock) = ready_rig(exact_config());
    handle.press(Switch::LimitTop);

    let up = rig.move_mm(1.0, 1.0).unwrap();
    assert_eq!(up.completed, 0);
    assert_eq!(up.end, MoveEnd::LimitReached(Switch::LimitTop));

    let down = rig.move_mm(-1.0, 1.0).unwrap();
    assert_eq!(down.completed, 1600);
    assert_eq!(down.end, MoveEnd::Completed);
}

#[test]
fn debounced_limit_needs_a_stable_interval() {
    // 20 ms debounce at 3 mm/s: a 1 ms glitch never stops the move.
    let (mut rig, handle, _clock) = ready_rig(Default::default());
    handle.schedule(100, SimAction::Press(Switch::LimitTop));
    handle.schedule(105, SimAction::Release(Switch::LimitTop));

    let report = rig.move_mm(1.0, 3.0).unwrap();
    assert_eq!(report.end, MoveEnd::Completed);
    assert_eq!(report.completed, 1600);
}

#[test]
fn motion_requires_an_enabled_axis() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    assert!(rig.arm().unwrap().is_armed());
    assert!(matches!(rig.move_mm(1.0, 1.0), Err(MotionError::NotEnabled)));
    assert_eq!(handle.pulses(), 0);
}

#[test]
fn disarmed_rig_emits_no_pulses() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    rig.enable_axis().unwrap();
    let report = rig.move_mm(1.0, 1.0).unwrap();
    assert_eq!(report.completed, 0);
    assert_eq!(report.end, MoveEnd::Disarmed);
    assert_eq!(handle.pulses(), 0);
}

#[test]
fn no_pulse_with_driver_disabled() {
    let (mut rig, handle, _clock) = ready_rig(exact_config());
    rig.move_mm(0.5, 3.0).unwrap();
    rig.disable_axis().unwrap();
    assert!(rig.move_mm(0.5, 3.0).is_err());
    assert_eq!(handle.pulses_while_disabled(), 0);
    assert_eq!(handle.pulses_while_deenergized(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn limit_stop_is_pulse_exact(n in 1u64..3200, up in any::<bool>()) {
        let (mut rig, handle, _clock) = ready_rig(exact_config());
        let (limit, distance) = if up {
            (Switch::LimitTop, 2.0)
        } else {
            (Switch::LimitBottom, -2.0)
        };
        handle.schedule(n, SimAction::Press(limit));

        let report = rig.move_mm(distance, 3.0).unwrap();

        prop_assert_eq!(report.completed, n);
        prop_assert_eq!(report.end, MoveEnd::LimitReached(limit));
        prop_assert_eq!(handle.pulses_into_limit(), 0);
    }

    #[test]
    fn pulses_match_distance(distance in -20.0f64..20.0, feed in 0.0f64..10.0) {
        let (mut rig, handle, _clock) = ready_rig(exact_config());
        handle.set_geometry(SimGeometry {
            top_limit_mm: None,
            bottom_limit_mm: None,
            ..Default::default()
        });

        let report = rig.move_mm(distance, feed).unwrap();

        prop_assert_eq!(report.completed, (distance.abs() * 1600.0).round() as u64);
        prop_assert_eq!(report.end, MoveEnd::Completed);
        prop_assert!((handle.position_mm() - report.distance_mm(1600.0)).abs() < 1e-9);
    }
}
