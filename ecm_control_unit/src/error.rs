//! Error types of the control unit.
//!
//! Only conditions the caller can act on are errors. Ordinary motion
//! outcomes (limit reached, disarmed mid-move, cancelled) are reported in
//! [`crate::motion::MoveReport`], not here.

use ecm_common::config::ConfigError;
use ecm_common::hal::driver::HalError;
use thiserror::Error;

/// Rejected or failed motion requests.
#[derive(Debug, Clone, Error)]
pub enum MotionError {
    /// The stepper driver is not enabled; no pulse was emitted.
    #[error("axis not enabled")]
    NotEnabled,

    /// Distance is NaN.
    #[error("invalid distance: {0}")]
    InvalidDistance(f64),

    /// Requested travel exceeds the configured stroke ceiling.
    #[error("move of {requested_mm} mm exceeds stroke limit of {limit_mm} mm")]
    StrokeExceeded {
        /// Requested |distance| [mm].
        requested_mm: f64,
        /// Configured ceiling [mm].
        limit_mm: f64,
    },

    /// A line write failed while moving.
    ///
    /// `completed` pulses had already been emitted; the caller owns the
    /// commanded distance and must account for them.
    #[error("HAL error during motion after {completed} pulses: {source}")]
    Hal {
        /// Failed write.
        #[source]
        source: HalError,
        /// Pulses emitted before the failure.
        completed: u64,
    },
}

impl From<HalError> for MotionError {
    fn from(source: HalError) -> Self {
        Self::Hal {
            source,
            completed: 0,
        }
    }
}

/// Errors raised while bringing the rig up or tearing it down.
#[derive(Debug, Error)]
pub enum RigError {
    /// Configuration invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Driver or line initialization failed; the rig must not move.
    #[error("hardware error: {0}")]
    Hal(#[from] HalError),

    /// Motion request failed.
    #[error(transparent)]
    Motion(#[from] MotionError),

    /// Monitor thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Thread {
        /// Thread name.
        name: &'static str,
        /// OS error.
        #[source]
        source: std::io::Error,
    },
}
