//! Feed-rate clamping and pulse timing.

use std::time::Duration;

use ecm_common::rig::config::MotionConfig;

/// Accepted feed range [mm/s].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedLimits {
    /// Lower bound.
    pub min_mm_s: f64,
    /// Upper bound.
    pub max_mm_s: f64,
}

impl FeedLimits {
    /// Limits from the motion section.
    pub fn from_config(config: &MotionConfig) -> Self {
        Self {
            min_mm_s: config.min_feed_mm_s,
            max_mm_s: config.max_feed_mm_s,
        }
    }

    /// Clamp a requested feed into range. NaN maps to the minimum.
    #[inline]
    pub fn clamp(&self, feed_mm_s: f64) -> f64 {
        if feed_mm_s.is_nan() {
            return self.min_mm_s;
        }
        feed_mm_s.clamp(self.min_mm_s, self.max_mm_s)
    }
}

/// STEP half-period for a feed: `1 / (2 × feed × steps_per_mm)`.
///
/// Rounded to whole nanoseconds, never shorter than 1 ns.
pub fn half_period(feed_mm_s: f64, steps_per_mm: f64) -> Duration {
    let ns = (1e9 / (2.0 * feed_mm_s * steps_per_mm)).round();
    if ns.is_finite() && ns >= 1.0 {
        Duration::from_nanos(ns as u64)
    } else {
        Duration::from_nanos(1)
    }
}
