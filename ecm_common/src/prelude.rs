//! Prelude module for common re-exports.
//!
//! ```rust
//! use ecm_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::rig::config::RigConfig;

// ─── Domain Types ───────────────────────────────────────────────────
pub use crate::rig::types::{
    ChannelReading, Direction, OutputLine, Polarity, PowerSnapshot, Switch, SwitchState,
};

// ─── HAL ────────────────────────────────────────────────────────────
pub use crate::hal::clock::{Clock, SystemClock};
pub use crate::hal::driver::{DriverFactory, FlowCallback, HalError, RigDriver};
pub use crate::hal::sensor::PowerSensor;
