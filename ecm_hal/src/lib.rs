//! # ECM HAL Library
//!
//! Hardware abstraction backends for the ECM drill rig.
//! Drivers implement the `RigDriver` trait defined in `ecm_common::hal::driver`.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Driver implementations
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          ecm_hal                              │
//! │  ┌──────────────────┐        ┌───────────────────────────┐    │
//! │  │  DriverRegistry  │──────► │ Box<dyn RigDriver>        │    │
//! │  │  name → factory  │        │  (simulation, ...)        │    │
//! │  └──────────────────┘        └───────────────────────────┘    │
//! └───────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod driver_registry;
pub mod drivers;

pub use crate::driver_registry::DriverRegistry;
pub use crate::drivers::builtin_registry;
