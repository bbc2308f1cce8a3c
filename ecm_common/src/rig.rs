//! Rig configuration schema and domain types.
//!
//! The schema in [`config`] is loaded once at startup and treated as
//! immutable for the whole run. [`types`] holds the small enums shared by the
//! HAL and the control unit.

pub mod config;
pub mod types;
