//! Safety module root.
//!
//! Relay interlock, E-STOP monitoring and power-cut detection.

pub mod interlock;
pub mod monitor;
pub mod power_cut;

pub use interlock::{ArmOutcome, ArmRefusal, EstopTransition, InterlockState, SafetyInterlock};
pub use monitor::{EstopMonitor, SafetyPoll, SafetyWatch};
pub use power_cut::{PowerCutDetector, PowerVerdict};
