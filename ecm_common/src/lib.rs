//! ECM Common Library
//!
//! Shared types, configuration loading and hardware abstraction traits for
//! every crate of the ECM drill rig workspace.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading trait, shared config and errors
//! - [`consts`] - Bench-rig defaults
//! - [`rig`] - Rig configuration schema and domain enums
//! - [`hal`] - `RigDriver`, `Clock` and `PowerSensor` traits
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use ecm_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
pub mod rig;
