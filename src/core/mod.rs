//! Core data types shared across the training engine.

pub mod policy_slot;
pub mod running_stats;
pub mod transition;

pub use policy_slot::{PolicyPublisher, PolicySlot, SharedPolicySlot};
pub use running_stats::WelfordRunningStat;
pub use transition::{GameTrajectory, TrajectoryError, TrajectorySegment, Transition};
