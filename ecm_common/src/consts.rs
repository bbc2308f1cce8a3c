//! Bench-rig defaults for the ECM drill.
//!
//! Single source of truth for the values used when a config key is omitted.
//! Mechanics: NEMA-17 (200 full steps/rev) on a TMC2209 at 16× microstepping,
//! driving a TR8x2 lead screw.

/// Full motor steps per revolution.
pub const STEPS_PER_REV: u32 = 200;

/// Driver microstep setting.
pub const MICROSTEP: u32 = 16;

/// Lead screw travel per revolution [mm].
pub const LEAD_MM_PER_REV: f64 = 2.0;

/// Slowest accepted feed [mm/s].
pub const MIN_FEED_MM_S: f64 = 0.05;

/// Jogging/feed ceiling [mm/s].
pub const MAX_FEED_MM_S: f64 = 3.0;

/// Longest single move accepted by the step generator [mm].
pub const MAX_STROKE_MM: f64 = 100.0;

/// Switch debounce interval [ms].
pub const DEBOUNCE_MS: u64 = 20;

/// E-STOP / power-cut monitor poll period [ms].
pub const SAFETY_POLL_MS: u64 = 10;

/// Consecutive low bus-voltage samples before a power cut is declared.
pub const POWER_CUT_SAMPLES: u32 = 3;

/// Homing back-off feed [mm/s].
pub const HOME_FEED_MM_S: f64 = 0.5;

/// Homing back-off distance [mm].
pub const HOME_BACKOFF_MM: f64 = 0.5;

/// Fast approach half-period [µs].
pub const HOME_FAST_HALF_PERIOD_US: u64 = 1000;

/// Slow re-approach half-period [µs].
pub const HOME_SLOW_HALF_PERIOD_US: u64 = 2000;

/// Pulse ceiling for each homing approach, as travel [mm].
pub const HOME_MAX_TRAVEL_MM: f64 = 120.0;

/// Pump MOSFET PWM frequency [Hz].
pub const PUMP_PWM_HZ: u32 = 1000;

/// Pump duty used by `on()` [%]. Bench-tuned starting point.
pub const PUMP_DUTY_RUN: f64 = 60.0;

/// Flow estimator lookback window [ms].
pub const FLOW_LOOKBACK_MS: u64 = 1000;

/// Default driver name.
pub const DEFAULT_DRIVER: &str = "simulation";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/rig.toml";
