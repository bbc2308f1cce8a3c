//! Motion module root.
//!
//! Feed clamping, pulse planning and the blocking step generator.

pub mod feed;
pub mod plan;
pub mod stepper;

pub use feed::FeedLimits;
pub use plan::PulsePlan;
pub use stepper::{AxisState, MoveEnd, MoveReport, StepGenerator};
