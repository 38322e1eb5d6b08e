//! Algorithm components.
//!
//! - `gae`: Generalized Advantage Estimation over harvested trajectories
//! - `policy_loss`: PPO clipped surrogate, value MSE, surrogate diagnostics

pub mod gae;
pub mod policy_loss;

pub use gae::{compute_gae, GaeOutput};
pub use policy_loss::{clip_fraction, ppo_clip_loss, sb3_kl_divergence, value_mse};
