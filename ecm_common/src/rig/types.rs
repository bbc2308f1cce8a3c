//! Domain enums shared between the HAL and the control unit.

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Axis Direction ─────────────────────────────────────────────────

/// Z-axis travel direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward the top limit (positive distance).
    Up,
    /// Toward the bottom limit (negative distance).
    Down,
}

impl Direction {
    /// Direction for a signed distance. Zero and NaN have no direction.
    pub fn from_distance(distance_mm: f64) -> Option<Self> {
        if distance_mm > 0.0 {
            Some(Self::Up)
        } else if distance_mm < 0.0 {
            Some(Self::Down)
        } else {
            None
        }
    }

    /// The opposite direction.
    #[inline]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// +1 for up, -1 for down.
    #[inline]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    /// Logical DIR line level (HIGH = up).
    #[inline]
    pub const fn dir_level(self) -> bool {
        matches!(self, Self::Up)
    }

    /// The limit switch facing this direction of travel.
    #[inline]
    pub const fn facing_limit(self) -> Switch {
        match self {
            Self::Up => Switch::LimitTop,
            Self::Down => Switch::LimitBottom,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

// ─── Digital Lines ──────────────────────────────────────────────────

/// Normally-closed switch inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Switch {
    /// Top travel limit.
    LimitTop,
    /// Bottom travel limit.
    LimitBottom,
    /// Emergency stop mushroom button.
    Estop,
}

impl Switch {
    /// All switches, in probe order.
    pub const ALL: [Switch; 3] = [Switch::LimitTop, Switch::LimitBottom, Switch::Estop];

    /// Stable index for per-switch arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::LimitTop => 0,
            Self::LimitBottom => 1,
            Self::Estop => 2,
        }
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LimitTop => write!(f, "limit_top"),
            Self::LimitBottom => write!(f, "limit_bottom"),
            Self::Estop => write!(f, "estop"),
        }
    }
}

/// Digital outputs driven by the control unit.
///
/// Levels are logical: `DriverEnable = true` means the stepper driver is
/// energized, whatever the electrical polarity of the EN pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputLine {
    /// Stepper STEP pulse line.
    Step,
    /// Stepper DIR line (HIGH = up).
    Direction,
    /// Stepper driver enable (logical).
    DriverEnable,
    /// Safety relay coil (HIGH = energized).
    Relay,
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step => write!(f, "step"),
            Self::Direction => write!(f, "dir"),
            Self::DriverEnable => write!(f, "enable"),
            Self::Relay => write!(f, "relay"),
        }
    }
}

// ─── Switch Polarity ────────────────────────────────────────────────

/// Raw level at which a switch reads as triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Triggered when the line reads LOW (pull-up wiring).
    #[default]
    ActiveLow,
    /// Triggered when the line reads HIGH.
    ActiveHigh,
}

impl Polarity {
    /// Map a raw level to the logical triggered flag.
    #[inline]
    pub const fn is_triggered(self, raw_high: bool) -> bool {
        match self {
            Self::ActiveLow => !raw_high,
            Self::ActiveHigh => raw_high,
        }
    }

    /// Raw level that represents `triggered`.
    #[inline]
    pub const fn raw_level(self, triggered: bool) -> bool {
        match self {
            Self::ActiveLow => !triggered,
            Self::ActiveHigh => triggered,
        }
    }
}

/// Debounced logical state of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    /// Switch is pressed / limit reached.
    Triggered,
    /// Switch is released.
    Clear,
}

impl SwitchState {
    /// Build from a logical flag.
    #[inline]
    pub const fn from_triggered(triggered: bool) -> Self {
        if triggered { Self::Triggered } else { Self::Clear }
    }

    /// Whether the switch reads as triggered.
    #[inline]
    pub const fn is_triggered(self) -> bool {
        matches!(self, Self::Triggered)
    }
}

// ─── Instrumentation ────────────────────────────────────────────────

/// One current/voltage sensor channel reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelReading {
    /// Bus voltage [V].
    pub bus_voltage_v: f64,
    /// Shunt voltage [V].
    pub shunt_voltage_v: f64,
    /// Current [mA].
    pub current_ma: f64,
    /// Power [mW].
    pub power_mw: f64,
}

/// Snapshot of all instrumentation channels.
///
/// A failed read degrades to zero values with `degraded = true`. Power-cut
/// detection looks only at `ecm_fault`: a zeroed ECM reading is "no
/// evidence", never a cut, and a pump channel fault does not hide the ECM bus.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerSnapshot {
    /// ECM process loop channel.
    pub ecm: ChannelReading,
    /// Pump branch channel, when fitted.
    pub pump: Option<ChannelReading>,
    /// At least one channel failed to read.
    pub degraded: bool,
    /// The ECM channel itself failed or is not fitted.
    #[serde(default)]
    pub ecm_fault: bool,
    /// Read failure description.
    pub note: Option<String>,
}
