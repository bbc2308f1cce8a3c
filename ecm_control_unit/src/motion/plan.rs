//! Pulse plans.

use std::time::Duration;

use ecm_common::rig::types::Direction;

use super::feed::{self, FeedLimits};

/// Direction, pulse count and STEP half-period of one move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulsePlan {
    /// Travel direction.
    pub direction: Direction,
    /// Pulses to emit.
    pub pulse_count: u64,
    /// HIGH and LOW hold time of each pulse.
    pub half_period: Duration,
}

impl PulsePlan {
    /// Plan a feed move. `None` when the distance rounds to zero pulses.
    ///
    /// The feed is clamped into `limits` first.
    pub fn for_move(
        distance_mm: f64,
        feed_mm_s: f64,
        steps_per_mm: f64,
        limits: &FeedLimits,
    ) -> Option<Self> {
        let direction = Direction::from_distance(distance_mm)?;
        let pulse_count = (distance_mm.abs() * steps_per_mm).round() as u64;
        if pulse_count == 0 {
            return None;
        }
        let feed = limits.clamp(feed_mm_s);
        Some(Self {
            direction,
            pulse_count,
            half_period: feed::half_period(feed, steps_per_mm),
        })
    }

    /// Plan with an explicit half-period (homing approaches).
    pub fn with_half_period(direction: Direction, pulse_count: u64, half_period: Duration) -> Self {
        Self {
            direction,
            pulse_count,
            half_period,
        }
    }

    /// Time to emit `pulses` pulses of this plan.
    pub fn duration_for(&self, pulses: u64) -> Duration {
        let ns = self.half_period.as_nanos() * 2 * u128::from(pulses);
        Duration::from_nanos(u64::try_from(ns).unwrap_or(u64::MAX))
    }

    /// Time to emit the whole plan.
    pub fn duration(&self) -> Duration {
        self.duration_for(self.pulse_count)
    }
}
