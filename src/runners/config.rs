//! Trainer configuration.

use std::path::PathBuf;

use crate::learner::{ConfigError, PPOLearnerConfig};

/// Configuration for [`super::Trainer`].
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Timesteps gathered per iteration before learning.
    pub timesteps_per_iteration: u64,
    /// Stop once this many cumulative timesteps are consumed; 0 runs
    /// unbounded.
    pub timestep_limit: u64,
    /// Experience buffer capacity in timesteps.
    pub exp_buffer_size: usize,
    /// Timesteps between checkpoint saves; 0 means once per iteration.
    pub timesteps_per_save: u64,
    /// Checkpoint output root; `None` disables saving.
    pub checkpoint_save_folder: Option<PathBuf>,
    /// Checkpoint root to resume from; `None` starts fresh.
    pub checkpoint_load_folder: Option<PathBuf>,
    /// Checkpoints kept on disk; `None` keeps all.
    pub checkpoints_to_keep: Option<usize>,
    /// Seed for buffer shuffling and action sampling.
    pub random_seed: u64,
    /// Collector threads.
    pub worker_count: usize,
    /// Game instances per collector thread.
    pub games_per_worker: usize,
    /// GAE discount factor γ.
    pub gae_gamma: f32,
    /// GAE smoothing parameter λ.
    pub gae_lambda: f32,
    /// Symmetric reward clip applied before standardization.
    pub reward_clip_range: Option<f32>,
    /// Divide rewards by the running return standard deviation.
    pub standardize_returns: bool,
    /// Returns folded into the running statistics per iteration.
    pub max_returns_per_stats_inc: usize,
    /// Observation standardization; not yet supported.
    pub standardize_obs: bool,
    /// Keep collectors running while the learner consumes the buffer.
    pub collection_during_learn: bool,
    /// Argmax actions everywhere; for performing, not training.
    pub deterministic: bool,
    /// Serialize collector inference through one mutex.
    pub block_concurrent_infer: bool,
    /// Drive the render sink instead of training.
    pub render_mode: bool,
    /// Render on worker 0 while the rest keep collecting.
    pub render_during_training: bool,
    /// Render playback speed multiplier.
    pub render_time_scale: f64,
    /// Learner configuration.
    pub ppo: PPOLearnerConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            timesteps_per_iteration: 50_000,
            timestep_limit: 0,
            exp_buffer_size: 150_000,
            timesteps_per_save: 5_000_000,
            checkpoint_save_folder: None,
            checkpoint_load_folder: None,
            checkpoints_to_keep: Some(5),
            random_seed: 123,
            worker_count: 8,
            games_per_worker: 16,
            gae_gamma: 0.99,
            gae_lambda: 0.95,
            reward_clip_range: Some(10.0),
            standardize_returns: true,
            max_returns_per_stats_inc: 150,
            standardize_obs: false,
            collection_during_learn: false,
            deterministic: false,
            block_concurrent_infer: false,
            render_mode: false,
            render_during_training: false,
            render_time_scale: 1.0,
            ppo: PPOLearnerConfig::default(),
        }
    }
}

impl TrainerConfig {
    /// Apply defaulting rules and render-mode coercions.
    ///
    /// Pure render sessions run one worker with one game, never save, and
    /// collect without an iteration bound.
    pub fn normalized(mut self) -> Self {
        if self.timesteps_per_save == 0 {
            self.timesteps_per_save = self.timesteps_per_iteration;
        }

        if self.render_mode && !self.render_during_training {
            self.worker_count = 1;
            self.games_per_worker = 1;
            self.checkpoint_save_folder = None;
            self.timesteps_per_iteration = u64::MAX;
        }

        self
    }

    /// Validate the configuration; all failures are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.standardize_obs {
            return Err(ConfigError::Unsupported("standardize_obs"));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::Unsupported("worker_count must be non-zero"));
        }
        self.ppo.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TrainerConfig::default().normalized().validate().is_ok());
    }

    #[test]
    fn test_standardize_obs_rejected() {
        let mut config = TrainerConfig::default();
        config.standardize_obs = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Unsupported("standardize_obs"))
        ));
    }

    #[test]
    fn test_zero_timesteps_per_save_defaults_to_iteration() {
        let mut config = TrainerConfig::default();
        config.timesteps_per_save = 0;
        config.timesteps_per_iteration = 1234;
        assert_eq!(config.normalized().timesteps_per_save, 1234);
    }

    #[test]
    fn test_render_mode_coercions() {
        let mut config = TrainerConfig::default();
        config.render_mode = true;
        config.worker_count = 8;
        config.checkpoint_save_folder = Some(PathBuf::from("/tmp/ckpt"));

        let normalized = config.normalized();
        assert_eq!(normalized.worker_count, 1);
        assert_eq!(normalized.games_per_worker, 1);
        assert!(normalized.checkpoint_save_folder.is_none());
        assert_eq!(normalized.timesteps_per_iteration, u64::MAX);
    }

    #[test]
    fn test_render_during_training_keeps_workers() {
        let mut config = TrainerConfig::default();
        config.render_mode = true;
        config.render_during_training = true;
        config.worker_count = 8;

        let normalized = config.normalized();
        assert_eq!(normalized.worker_count, 8);
    }
}
