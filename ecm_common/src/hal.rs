//! Hardware abstraction traits.
//!
//! The control unit never touches GPIO, PWM or I²C directly. It talks to a
//! [`driver::RigDriver`], measures time through a [`clock::Clock`], and
//! polls instrumentation through [`sensor::PowerSensor`]. Backends live in
//! the `ecm_hal` crate.

pub mod clock;
pub mod driver;
pub mod sensor;
