//! # ECM Control Unit Library
//!
//! Motion and safety core of the ECM drill rig: one stepper-driven Z axis,
//! two limit switches, an E-STOP mushroom, a safety relay feeding the ECM
//! and pump supplies, a PWM electrolyte pump with flow sensor, and two
//! power-sensor channels.
//!
//! ## Layers
//!
//! 1. **Inputs** ([`input`]) - debounced, polarity-mapped switch states
//! 2. **Safety** ([`safety`]) - relay interlock, E-STOP monitor, power-cut detection
//! 3. **Motion** ([`motion`]) - feed clamp, pulse plans, blocking step generator
//! 4. **Homing** ([`homing`]) - approach / back-off / slow re-approach
//! 5. **Pump** ([`pump`]) - duty control and flow estimation
//! 6. **Rig** ([`rig`]) - owns everything, guarantees the shutdown order
//!
//! ## Threads
//!
//! Motion runs blocking on the calling thread. The E-STOP monitor runs on its
//! own thread and talks to the control thread only through the interlock's
//! atomic flags, which the step generator reads before every pulse.

pub mod error;
pub mod hardware;
pub mod homing;
pub mod input;
pub mod instrument;
pub mod journal;
pub mod motion;
pub mod pump;
pub mod rig;
pub mod rt;
pub mod safety;
pub mod sequence;

pub use crate::error::{MotionError, RigError};
pub use crate::rig::Rig;
