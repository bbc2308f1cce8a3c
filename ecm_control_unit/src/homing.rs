//! Homing state machine.
//!
//! Establishes the Z zero from the home limit alone (open-loop, no encoder):
//!
//! | Phase          | Motion                                     | Ends when               |
//! |----------------|--------------------------------------------|-------------------------|
//! | `Approaching`  | toward home at the fast half-period        | home limit triggered    |
//! | (settle)       | none, one debounce interval                |                         |
//! | `Backoff`      | `backoff_mm` away at `feed_mm_s` (clamped) | distance covered        |
//! | `SlowApproach` | toward home at the slow half-period        | home limit triggered    |
//! | `Homed`        | none                                       | `position_known = true` |
//!
//! Each approach is bounded by `max_travel_mm` worth of pulses. Any phase
//! ending otherwise (disarmed, cancelled, wrong limit, ceiling reached)
//! aborts the run; there is no resume, the caller re-invokes `run()` and
//! `position_known` stays false until a full run succeeds.

use ecm_common::rig::config::HomingConfig;
use ecm_common::rig::types::Direction;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::MotionError;
use crate::input::InputLayer;
use crate::motion::{MoveEnd, MoveReport, PulsePlan, StepGenerator};

// ─── Phases ─────────────────────────────────────────────────────────

/// Homing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HomingPhase {
    /// Not started.
    Idle,
    /// Fast approach toward the home limit.
    Approaching,
    /// Back-off away from the home limit.
    Backoff,
    /// Slow re-approach.
    SlowApproach,
    /// Zero established.
    Homed,
    /// Last run did not complete.
    Aborted,
}

/// Pulses and end condition of one motion phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    /// Phase.
    pub phase: HomingPhase,
    /// Pulses emitted.
    pub pulses: u64,
    /// Why the phase's pulse train ended.
    pub end: MoveEnd,
}

/// How a homing run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HomingOutcome {
    /// Zero established.
    Homed,
    /// A phase ended early (disarmed, cancelled, wrong limit).
    Aborted {
        /// Phase that ended early.
        phase: HomingPhase,
        /// Its end condition.
        end: MoveEnd,
    },
    /// An approach used its whole pulse ceiling without reaching the limit.
    LimitNotFound {
        /// Approach that ran out.
        phase: HomingPhase,
    },
}

/// Phase log and outcome of a homing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomingReport {
    /// Motion phases in execution order.
    pub phases: Vec<PhaseRecord>,
    /// Final outcome.
    pub outcome: HomingOutcome,
}

impl HomingReport {
    /// Whether the run reached `Homed`.
    pub fn is_homed(&self) -> bool {
        self.outcome == HomingOutcome::Homed
    }

    /// Phases entered, in order.
    pub fn phase_sequence(&self) -> Vec<HomingPhase> {
        self.phases.iter().map(|p| p.phase).collect()
    }

    /// Pulses emitted over all phases.
    pub fn total_pulses(&self) -> u64 {
        self.phases.iter().map(|p| p.pulses).sum()
    }
}

// ─── Sequence ───────────────────────────────────────────────────────

/// Homing driver over the step generator.
#[derive(Debug, Clone)]
pub struct HomingSequence {
    config: HomingConfig,
    phase: HomingPhase,
}

impl HomingSequence {
    /// Sequence in `Idle`.
    pub fn new(config: &HomingConfig) -> Self {
        Self {
            config: config.clone(),
            phase: HomingPhase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> HomingPhase {
        self.phase
    }

    /// Direction of the home limit.
    pub fn direction(&self) -> Direction {
        self.config.direction
    }

    /// Run a full homing cycle, enabling the axis first.
    ///
    /// Routine aborts are reported in the [`HomingReport`].
    ///
    /// # Errors
    ///
    /// Only HAL failures and rejected moves; the phase is left `Aborted`.
    pub fn run(
        &mut self,
        stepper: &mut StepGenerator,
        inputs: &InputLayer,
    ) -> Result<HomingReport, MotionError> {
        let result = self.run_phases(stepper, inputs);
        match &result {
            Ok(report) if report.is_homed() => {
                stepper.set_position_known(true);
                self.advance(HomingPhase::Homed);
                info!("Homing complete ({} pulses)", report.total_pulses());
            }
            Ok(report) => {
                self.advance(HomingPhase::Aborted);
                warn!("Homing aborted: {:?}", report.outcome);
            }
            Err(e) => {
                self.advance(HomingPhase::Aborted);
                warn!("Homing failed: {e}");
            }
        }
        result
    }

    fn run_phases(
        &mut self,
        stepper: &mut StepGenerator,
        inputs: &InputLayer,
    ) -> Result<HomingReport, MotionError> {
        stepper.set_position_known(false);
        stepper.enable()?;

        let toward = self.config.direction;
        let home = toward.facing_limit();
        let ceiling = (self.config.max_travel_mm * stepper.steps_per_mm()).ceil() as u64;
        let mut phases = Vec::with_capacity(3);

        // Approaching
        self.advance(HomingPhase::Approaching);
        let fast = PulsePlan::with_half_period(toward, ceiling, self.config.fast_half_period());
        let report = stepper.execute(&fast)?;
        phases.push(record(HomingPhase::Approaching, &report));
        if let Some(outcome) = approach_failure(HomingPhase::Approaching, &report) {
            return Ok(HomingReport { phases, outcome });
        }

        let settled = inputs.settle(home);
        debug!("Home limit {home} after settle: {settled:?}");

        // Backoff
        self.advance(HomingPhase::Backoff);
        let away = toward.reversed().sign() as f64 * self.config.backoff_mm;
        let report = stepper.move_mm(away, self.config.feed_mm_s)?;
        phases.push(record(HomingPhase::Backoff, &report));
        if report.end != MoveEnd::Completed {
            let outcome = HomingOutcome::Aborted {
                phase: HomingPhase::Backoff,
                end: report.end,
            };
            return Ok(HomingReport { phases, outcome });
        }

        inputs.settle(home);

        // SlowApproach
        self.advance(HomingPhase::SlowApproach);
        let slow = PulsePlan::with_half_period(toward, ceiling, self.config.slow_half_period());
        let report = stepper.execute(&slow)?;
        phases.push(record(HomingPhase::SlowApproach, &report));
        if let Some(outcome) = approach_failure(HomingPhase::SlowApproach, &report) {
            return Ok(HomingReport { phases, outcome });
        }

        Ok(HomingReport {
            phases,
            outcome: HomingOutcome::Homed,
        })
    }

    fn advance(&mut self, next: HomingPhase) {
        if self.phase != next {
            info!("Homing {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }
}

fn record(phase: HomingPhase, report: &MoveReport) -> PhaseRecord {
    debug!("Homing {phase:?}: {} pulses, {:?}", report.completed, report.end);
    PhaseRecord {
        phase,
        pulses: report.completed,
        end: report.end,
    }
}

/// `None` when an approach stopped on its target limit.
fn approach_failure(phase: HomingPhase, report: &MoveReport) -> Option<HomingOutcome> {
    let target = report.direction.map(Direction::facing_limit);
    match report.end {
        MoveEnd::LimitReached(sw) if Some(sw) == target => None,
        MoveEnd::Completed => Some(HomingOutcome::LimitNotFound { phase }),
        end => Some(HomingOutcome::Aborted { phase, end }),
    }
}
