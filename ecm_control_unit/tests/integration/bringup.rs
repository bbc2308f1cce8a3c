//! Integration test: bring-up sequence with a journal file.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use ecm_common::hal::sensor::PowerSensor;
use ecm_common::rig::types::Switch;
use ecm_control_unit::Rig;
use ecm_control_unit::instrument::Instrumentation;
use ecm_control_unit::journal::{JournalRecord, JsonlJournal, MemoryJournal};
use ecm_control_unit::motion::MoveEnd;
use ecm_control_unit::sequence::{BringUp, BringUpEnd, BringUpPlan};
use ecm_hal::drivers::simulation::{SimAction, SimClock, SimPowerSensor, SimulationDriver};
use parking_lot::Mutex;
use tempfile::tempdir;

use super::common::{exact_config, sim_rig};

fn plan() -> BringUpPlan {
    BringUpPlan {
        sweep_dwell: Duration::from_millis(100),
        ..Default::default()
    }
}

#[test]
fn bring_up_writes_a_jsonl_journal() {
    let driver = SimulationDriver::new();
    let handle = driver.handle();
    let ecm: Arc<dyn PowerSensor> = Arc::new(SimPowerSensor::powered("ecm", 12.0));
    let pump: Arc<dyn PowerSensor> = Arc::new(SimPowerSensor::powered("pump", 12.0));
    let mut rig = Rig::start(
        exact_config(),
        Box::new(driver),
        Arc::new(SimClock::new()),
        Instrumentation::new(ecm, Some(pump)),
    )
    .unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("bringup.jsonl");
    let mut journal = JsonlJournal::open(&path).unwrap();

    let summary = BringUp::new(&mut rig, &mut journal, plan()).run().unwrap();
    drop(journal);

    assert_eq!(summary.end, BringUpEnd::Completed);
    let records: Vec<JournalRecord> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 14);
    assert_eq!(records.first().unwrap().state, "start");
    assert_eq!(records.last().unwrap().state, "idle");
    assert!(records.iter().all(|r| r.ecm_v == 12.0));
    assert!(records.iter().any(|r| r.state == "homed" && r.position_known && r.armed));

    // Jogs return to the home position; the feed demo nets zero.
    assert_eq!(handle.position_steps(), 16_000);
    assert!(!handle.relay());
    assert!(!handle.enabled());
}

#[test]
fn estop_during_jog_ends_bring_up() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    let watch = Mutex::new(rig.safety_watch());
    let press = handle.clone();
    // Homing emits 16 000 + 800 + 800 pulses; press 100 pulses into the first jog.
    handle.schedule(
        17_700,
        SimAction::Call(Arc::new(move || {
            press.press(Switch::Estop);
            watch.lock().poll();
        })),
    );
    let mut journal = MemoryJournal::new();

    let summary = BringUp::new(&mut rig, &mut journal, plan()).run().unwrap();

    assert_eq!(summary.end, BringUpEnd::Disarmed);
    assert_eq!(summary.moves.len(), 1);
    assert_eq!(summary.moves[0].completed, 100);
    assert_eq!(summary.moves[0].end, MoveEnd::Disarmed);
    assert_eq!(journal.states(), vec!["start", "armed", "homed", "jog", "idle"]);
    assert_eq!(handle.pump_duty(), 0.0);
}

#[test]
fn pump_sweep_is_gated_after_disarm() {
    let (mut rig, handle, _clock) = sim_rig(exact_config());
    let mut journal = MemoryJournal::new();
    BringUp::new(&mut rig, &mut journal, plan()).run().unwrap();

    // Sequence left the rig idle: duty requests are recorded but not applied.
    let cmd = rig.set_pump_duty(80.0);
    assert_eq!(cmd.requested, 80.0);
    assert_eq!(cmd.applied, 0.0);
    assert_eq!(handle.pump_duty(), 0.0);
}
