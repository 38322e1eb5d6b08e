//! The PPO learner and its supporting pieces.

pub mod config;
pub mod grad_noise;
pub mod grad_scaler;
pub mod ppo_learner;

pub use config::{ConfigError, DeviceKind, PPOLearnerConfig};
pub use grad_noise::GradNoiseTracker;
pub use grad_scaler::GradScaler;
pub use ppo_learner::{LearnError, PPOLearner};
