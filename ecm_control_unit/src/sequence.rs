//! Bench bring-up sequence.
//!
//! arm → home → jog → pump sweep → feed demo at run duty → idle.
//!
//! Home sits on a limit, so the jog and the demo first move away from the
//! home limit and then return to it.
//!
//! Every step is journaled. Cancellation is checked between steps, during
//! dwells and (through the step generator) before every pulse. Whatever
//! happens, the sequence finishes by putting the rig idle: pump off, axis
//! disabled, relay off.

use std::time::Duration;

use tracing::{info, warn};

use crate::error::RigError;
use crate::homing::{HomingOutcome, HomingReport};
use crate::journal::{JournalRecord, JournalSink};
use crate::motion::{MoveEnd, MoveReport};
use crate::rig::Rig;

/// Bring-up parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BringUpPlan {
    /// Jog distance each way [mm].
    pub jog_mm: f64,
    /// Jog feed [mm/s]; `None` uses the homing feed.
    pub jog_feed_mm_s: Option<f64>,
    /// Pump duties visited in order [%].
    pub sweep: Vec<f64>,
    /// Dwell at each sweep duty.
    pub sweep_dwell: Duration,
    /// Feed demo distance each way [mm].
    pub demo_mm: f64,
    /// Feed demo speed [mm/s].
    pub demo_feed_mm_s: f64,
}

impl Default for BringUpPlan {
    fn default() -> Self {
        Self {
            jog_mm: 3.0,
            jog_feed_mm_s: None,
            sweep: vec![20.0, 40.0, 60.0, 80.0, 100.0, 0.0],
            sweep_dwell: Duration::from_secs(2),
            demo_mm: 2.0,
            demo_feed_mm_s: 1.0,
        }
    }
}

/// How the sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpEnd {
    /// Every step ran.
    Completed,
    /// `arm()` refused (E-STOP active).
    ArmRefused,
    /// Homing did not reach `Homed`.
    HomingFailed(HomingOutcome),
    /// Interlock dropped during a move.
    Disarmed,
    /// Operator cancelled.
    Cancelled,
}

/// What the sequence did.
#[derive(Debug, Clone)]
pub struct BringUpSummary {
    /// End condition.
    pub end: BringUpEnd,
    /// Homing report, if homing ran.
    pub homing: Option<HomingReport>,
    /// Jog and demo moves, in order.
    pub moves: Vec<MoveReport>,
    /// Journal appends that failed.
    pub journal_errors: usize,
}

/// Bring-up runner over a started rig.
pub struct BringUp<'a> {
    rig: &'a mut Rig,
    journal: &'a mut dyn JournalSink,
    plan: BringUpPlan,
    journal_errors: usize,
}

impl<'a> BringUp<'a> {
    /// Runner with `plan`, journaling to `journal`.
    pub fn new(rig: &'a mut Rig, journal: &'a mut dyn JournalSink, plan: BringUpPlan) -> Self {
        Self {
            rig,
            journal,
            plan,
            journal_errors: 0,
        }
    }

    /// Run the sequence and leave the rig idle.
    ///
    /// # Errors
    ///
    /// HAL failures; the rig is still put idle before returning.
    pub fn run(mut self) -> Result<BringUpSummary, RigError> {
        let mut homing = None;
        let mut moves = Vec::new();
        let result = self.steps(&mut homing, &mut moves);
        let idle = self.go_idle();

        let end = result?;
        idle?;
        info!("Bring-up finished: {end:?}");
        Ok(BringUpSummary {
            end,
            homing,
            moves,
            journal_errors: self.journal_errors,
        })
    }

    fn steps(
        &mut self,
        homing: &mut Option<HomingReport>,
        moves: &mut Vec<MoveReport>,
    ) -> Result<BringUpEnd, RigError> {
        self.record("start", "");

        // Arm
        if !self.rig.arm()?.is_armed() {
            self.record("arm_refused", "E-STOP active");
            return Ok(BringUpEnd::ArmRefused);
        }
        self.record("armed", "");

        // Home
        let report = self.rig.home()?;
        let outcome = report.outcome;
        *homing = Some(report);
        if outcome != HomingOutcome::Homed {
            self.record("homing_failed", &format!("{outcome:?}"));
            return Ok(match outcome {
                HomingOutcome::Aborted {
                    end: MoveEnd::Cancelled,
                    ..
                } => BringUpEnd::Cancelled,
                other => BringUpEnd::HomingFailed(other),
            });
        }
        self.record("homed", "");

        // Jog
        let jog_feed = self
            .plan
            .jog_feed_mm_s
            .unwrap_or(self.rig.config().homing.feed_mm_s);
        let away = self.away_from_home();
        for distance in [away * self.plan.jog_mm, -away * self.plan.jog_mm] {
            if let Some(end) = self.feed_move("jog", distance, jog_feed, moves)? {
                return Ok(end);
            }
        }

        // Pump sweep
        let sweep = self.plan.sweep.clone();
        for duty in sweep {
            if self.rig.is_cancelled() {
                return Ok(BringUpEnd::Cancelled);
            }
            let cmd = self.rig.set_pump_duty(duty);
            if !self.dwell(self.plan.sweep_dwell) {
                return Ok(BringUpEnd::Cancelled);
            }
            self.record("pump_sweep", &format!("duty {:.0}%", cmd.applied));
        }

        // Feed demo at run duty
        self.rig.pump_on();
        let demo_feed = self.plan.demo_feed_mm_s;
        for distance in [away * self.plan.demo_mm, -away * self.plan.demo_mm] {
            if let Some(end) = self.feed_move("feed_demo", distance, demo_feed, moves)? {
                return Ok(end);
            }
        }

        Ok(BringUpEnd::Completed)
    }

    /// Sign of travel leaving the home limit.
    fn away_from_home(&self) -> f64 {
        self.rig.config().homing.direction.reversed().sign() as f64
    }

    /// One journaled move; `Some(end)` when the sequence must stop.
    fn feed_move(
        &mut self,
        state: &str,
        distance_mm: f64,
        feed_mm_s: f64,
        moves: &mut Vec<MoveReport>,
    ) -> Result<Option<BringUpEnd>, RigError> {
        if self.rig.is_cancelled() {
            return Ok(Some(BringUpEnd::Cancelled));
        }
        let report = self.rig.move_mm(distance_mm, feed_mm_s)?;
        moves.push(report);
        self.record(
            state,
            &format!(
                "{distance_mm:+.2} mm @ {feed_mm_s:.2} mm/s: {}/{} pulses, {:?}",
                report.completed, report.requested, report.end
            ),
        );
        Ok(match report.end {
            MoveEnd::Disarmed => Some(BringUpEnd::Disarmed),
            MoveEnd::Cancelled => Some(BringUpEnd::Cancelled),
            MoveEnd::Completed | MoveEnd::LimitReached(_) => None,
        })
    }

    /// Sleep on the rig clock in poll-sized slices; `false` if cancelled.
    fn dwell(&self, total: Duration) -> bool {
        let slice = self.rig.config().safety.poll_interval();
        let mut left = total;
        while !left.is_zero() {
            if self.rig.is_cancelled() {
                return false;
            }
            let step = left.min(slice);
            self.rig.clock().sleep(step);
            left -= step;
        }
        !self.rig.is_cancelled()
    }

    fn go_idle(&mut self) -> Result<(), RigError> {
        self.rig.pump_off();
        let axis = self.rig.disable_axis();
        let relay = self.rig.disarm();
        self.record("idle", "");
        axis.and(relay)
    }

    fn record(&mut self, state: &str, note: &str) {
        let record = JournalRecord::from_snapshot(state, &self.rig.snapshot(), note);
        if let Err(e) = self.journal.append(&record) {
            self.journal_errors += 1;
            warn!("Journal append failed: {e}");
        }
    }
}
