//! Rig configuration schema.
//!
//! Loaded once from `rig.toml`, validated, then shared read-only for the
//! whole run. Every section has bench-rig defaults from [`crate::consts`].
//!
//! ```toml
//! [shared]
//! service_name = "ecm-bench-01"
//!
//! [motion]
//! min_feed_mm_s = 0.05
//! max_feed_mm_s = 3.0
//!
//! [homing]
//! direction = "up"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SharedConfig};
use crate::consts;
use crate::rig::types::{Direction, Polarity, Switch};

// ─── Sections ───────────────────────────────────────────────────────

/// HAL driver selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Registered driver name.
    pub name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: consts::DEFAULT_DRIVER.to_string(),
        }
    }
}

/// Mechanics and feed limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionConfig {
    /// Full motor steps per revolution.
    pub steps_per_rev: u32,
    /// Driver microstep setting.
    pub microstep: u32,
    /// Lead screw travel per revolution [mm].
    pub lead_mm_per_rev: f64,
    /// Explicit resolution, overrides the derived value.
    pub steps_per_mm: Option<f64>,
    /// Lower feed clamp [mm/s].
    pub min_feed_mm_s: f64,
    /// Upper feed clamp [mm/s].
    pub max_feed_mm_s: f64,
    /// Longest accepted single move [mm].
    pub max_stroke_mm: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            steps_per_rev: consts::STEPS_PER_REV,
            microstep: consts::MICROSTEP,
            lead_mm_per_rev: consts::LEAD_MM_PER_REV,
            steps_per_mm: None,
            min_feed_mm_s: consts::MIN_FEED_MM_S,
            max_feed_mm_s: consts::MAX_FEED_MM_S,
            max_stroke_mm: consts::MAX_STROKE_MM,
        }
    }
}

impl MotionConfig {
    /// Microsteps per millimetre of Z travel.
    pub fn steps_per_mm(&self) -> f64 {
        self.steps_per_mm.unwrap_or_else(|| {
            (self.steps_per_rev as f64 * self.microstep as f64) / self.lead_mm_per_rev
        })
    }
}

/// Switch polarity and debounce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputsConfig {
    /// Minimum stable time before a level change is accepted [ms].
    pub debounce_ms: u64,
    /// Top limit polarity.
    pub limit_top: Polarity,
    /// Bottom limit polarity.
    pub limit_bottom: Polarity,
    /// E-STOP polarity.
    pub estop: Polarity,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            debounce_ms: consts::DEBOUNCE_MS,
            limit_top: Polarity::ActiveLow,
            limit_bottom: Polarity::ActiveLow,
            estop: Polarity::ActiveLow,
        }
    }
}

impl InputsConfig {
    /// Debounce interval.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Polarity of `switch`.
    pub fn polarity(&self, switch: Switch) -> Polarity {
        match switch {
            Switch::LimitTop => self.limit_top,
            Switch::LimitBottom => self.limit_bottom,
            Switch::Estop => self.estop,
        }
    }
}

/// Homing sequence parameters.
///
/// The approach half-periods are bench-tuned, not derived; they stay
/// configurable for that reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HomingConfig {
    /// Which limit is home.
    pub direction: Direction,
    /// Back-off feed [mm/s].
    pub feed_mm_s: f64,
    /// Back-off distance [mm].
    pub backoff_mm: f64,
    /// Fast approach half-period [µs].
    pub fast_half_period_us: u64,
    /// Slow re-approach half-period [µs].
    pub slow_half_period_us: u64,
    /// Pulse ceiling of each approach, as travel [mm].
    pub max_travel_mm: f64,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Up,
            feed_mm_s: consts::HOME_FEED_MM_S,
            backoff_mm: consts::HOME_BACKOFF_MM,
            fast_half_period_us: consts::HOME_FAST_HALF_PERIOD_US,
            slow_half_period_us: consts::HOME_SLOW_HALF_PERIOD_US,
            max_travel_mm: consts::HOME_MAX_TRAVEL_MM,
        }
    }
}

impl HomingConfig {
    /// Fast approach half-period.
    pub fn fast_half_period(&self) -> Duration {
        Duration::from_micros(self.fast_half_period_us)
    }

    /// Slow re-approach half-period.
    pub fn slow_half_period(&self) -> Duration {
        Duration::from_micros(self.slow_half_period_us)
    }
}

/// Electrolyte pump and flow sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PumpConfig {
    /// PWM carrier frequency [Hz].
    pub pwm_hz: u32,
    /// Duty used by `on()` [%].
    pub run_duty: f64,
    /// Flow sensor calibration; `None` when no sensor is fitted.
    pub flow_pulses_per_liter: Option<f64>,
    /// Flow estimator lookback [ms].
    pub flow_lookback_ms: u64,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            pwm_hz: consts::PUMP_PWM_HZ,
            run_duty: consts::PUMP_DUTY_RUN,
            flow_pulses_per_liter: None,
            flow_lookback_ms: consts::FLOW_LOOKBACK_MS,
        }
    }
}

impl PumpConfig {
    /// Flow estimator lookback window.
    pub fn flow_lookback(&self) -> Duration {
        Duration::from_millis(self.flow_lookback_ms)
    }
}

/// E-STOP monitor and power-cut detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafetyConfig {
    /// Monitor poll period [ms].
    pub poll_ms: u64,
    /// ECM bus voltage below which power is considered cut [V]; `None` disables.
    pub power_cut_bus_v: Option<f64>,
    /// Consecutive low samples required.
    pub power_cut_samples: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            poll_ms: consts::SAFETY_POLL_MS,
            power_cut_bus_v: None,
            power_cut_samples: consts::POWER_CUT_SAMPLES,
        }
    }
}

impl SafetyConfig {
    /// Monitor poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

// ─── Root ───────────────────────────────────────────────────────────

/// Complete rig configuration (`rig.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RigConfig {
    /// Service identity and log level.
    pub shared: SharedConfig,
    /// HAL driver selection.
    pub driver: DriverConfig,
    /// Mechanics and feed limits.
    pub motion: MotionConfig,
    /// Switch polarity and debounce.
    pub inputs: InputsConfig,
    /// Homing parameters.
    pub homing: HomingConfig,
    /// Pump and flow sensor.
    pub pump: PumpConfig,
    /// E-STOP monitor.
    pub safety: SafetyConfig,
}

impl RigConfig {
    /// Validate parameter bounds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.driver.name.is_empty() {
            return Err(invalid("driver.name cannot be empty"));
        }

        let m = &self.motion;
        if m.steps_per_mm.is_none()
            && (m.steps_per_rev == 0 || m.microstep == 0 || !(m.lead_mm_per_rev > 0.0))
        {
            return Err(invalid(
                "motion.steps_per_rev, motion.microstep and motion.lead_mm_per_rev must be > 0",
            ));
        }
        let spm = m.steps_per_mm();
        if !spm.is_finite() || spm <= 0.0 {
            return Err(invalid(format!("motion.steps_per_mm must be > 0 (got {spm})")));
        }
        if !(m.min_feed_mm_s > 0.0) || !m.min_feed_mm_s.is_finite() {
            return Err(invalid("motion.min_feed_mm_s must be > 0"));
        }
        if !(m.max_feed_mm_s >= m.min_feed_mm_s) || !m.max_feed_mm_s.is_finite() {
            return Err(invalid("motion.max_feed_mm_s must be >= motion.min_feed_mm_s"));
        }
        if !(m.max_stroke_mm > 0.0) || !m.max_stroke_mm.is_finite() {
            return Err(invalid("motion.max_stroke_mm must be > 0"));
        }

        let h = &self.homing;
        if !(h.feed_mm_s > 0.0) {
            return Err(invalid("homing.feed_mm_s must be > 0"));
        }
        if h.fast_half_period_us == 0 || h.slow_half_period_us == 0 {
            return Err(invalid("homing half-periods must be > 0"));
        }
        if !(h.backoff_mm > 0.0) {
            return Err(invalid("homing.backoff_mm must be > 0"));
        }
        if !(h.max_travel_mm > h.backoff_mm) || !h.max_travel_mm.is_finite() {
            return Err(invalid("homing.max_travel_mm must exceed homing.backoff_mm"));
        }

        let p = &self.pump;
        if p.pwm_hz == 0 {
            return Err(invalid("pump.pwm_hz must be > 0"));
        }
        if !(0.0..=100.0).contains(&p.run_duty) {
            return Err(invalid("pump.run_duty must be within 0..=100"));
        }
        if p.flow_lookback_ms == 0 {
            return Err(invalid("pump.flow_lookback_ms must be > 0"));
        }

        let s = &self.safety;
        if s.poll_ms == 0 {
            return Err(invalid("safety.poll_ms must be > 0"));
        }
        if s.power_cut_bus_v.is_some() && s.power_cut_samples == 0 {
            return Err(invalid("safety.power_cut_samples must be > 0"));
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}
