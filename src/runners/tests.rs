//! End-to-end trainer tests over a deterministic toy environment.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use burn::backend::{Autodiff, NdArray};

use crate::environment::{EnvCreateFn, Gym, StepResult};
use crate::learner::PPOLearnerConfig;
use crate::metrics::{MetricsSink, Report};
use crate::runners::{Trainer, TrainerConfig, TrainerError};

type B = Autodiff<NdArray<f32>>;

/// Single-player game: observation encodes the step index, episodes end
/// after a fixed number of steps, every step pays reward 1.
struct CountingGym {
    step: u32,
    episode_len: u32,
}

impl Gym for CountingGym {
    fn reset(&mut self) -> Vec<Vec<f32>> {
        self.step = 0;
        vec![vec![0.0, 0.0, 1.0]]
    }

    fn step(&mut self, _actions: &[u32]) -> StepResult {
        self.step += 1;
        StepResult {
            next_obs: vec![vec![self.step as f32 * 0.1, 0.0, 1.0]],
            rewards: vec![1.0],
            done: self.step >= self.episode_len,
        }
    }

    fn player_count(&self) -> usize {
        1
    }

    fn action_count(&self) -> usize {
        2
    }
}

fn create_fn() -> EnvCreateFn {
    Arc::new(|| {
        Box::new(CountingGym {
            step: 0,
            episode_len: 6,
        })
    })
}

fn small_config() -> TrainerConfig {
    let mut config = TrainerConfig::default();
    config.timesteps_per_iteration = 32;
    config.timestep_limit = 32;
    config.exp_buffer_size = 64;
    config.worker_count = 1;
    config.games_per_worker = 2;
    config.timesteps_per_save = 5_000_000;
    config.ppo = PPOLearnerConfig::default()
        .with_epochs(1)
        .with_batch_size(32)
        .with_mini_batch_size(16)
        .with_policy_layer_sizes(vec![8])
        .with_critic_layer_sizes(vec![8])
        .with_learning_rates(1e-3, 1e-3);
    config
}

#[test]
fn test_single_iteration_trains_and_counts_timesteps() {
    let mut trainer =
        Trainer::<B>::new(create_fn(), small_config(), Default::default(), None, None).unwrap();

    assert_eq!(trainer.obs_size(), 3);
    assert_eq!(trainer.action_count(), 2);

    let before = trainer.learner().policy().flat_params();
    trainer.learn().unwrap();

    assert!(trainer.cumulative_timesteps() >= 32);
    assert!(trainer.learner().cumulative_model_updates() >= 1);
    assert_ne!(before, trainer.learner().policy().flat_params());
}

#[test]
fn test_zero_learning_rates_skip_learning() {
    let mut config = small_config();
    config.timestep_limit = 64;
    config.ppo = config.ppo.with_learning_rates(0.0, 0.0);

    let mut trainer =
        Trainer::<B>::new(create_fn(), config, Default::default(), None, None).unwrap();

    let before = trainer.learner().policy().flat_params();
    trainer.learn().unwrap();

    assert!(trainer.cumulative_timesteps() >= 64);
    assert_eq!(trainer.learner().cumulative_model_updates(), 0);
    assert_eq!(before, trainer.learner().policy().flat_params());
}

#[test]
fn test_deterministic_mode_rejects_learning() {
    let mut config = small_config();
    config.deterministic = true;

    let mut trainer =
        Trainer::<B>::new(create_fn(), config, Default::default(), None, None).unwrap();

    assert!(matches!(
        trainer.learn(),
        Err(TrainerError::DeterministicLearn)
    ));
}

#[test]
fn test_checkpoint_save_and_resume() {
    let dir = tempfile::tempdir().unwrap();

    let mut config = small_config();
    config.checkpoint_save_folder = Some(dir.path().to_path_buf());
    config.timesteps_per_save = 1; // save after the first iteration

    let mut trainer =
        Trainer::<B>::new(create_fn(), config, Default::default(), None, None).unwrap();
    trainer.learn().unwrap();
    let saved_timesteps = trainer.cumulative_timesteps();
    let saved_params = trainer.learner().policy().flat_params();

    // The checkpoint directory is named by the cumulative timestep count.
    let ckpt_dir = dir.path().join(saved_timesteps.to_string());
    assert!(ckpt_dir.is_dir());
    assert!(ckpt_dir.join("RUNNING_STATS.json").exists());

    let mut resume_config = small_config();
    resume_config.checkpoint_load_folder = Some(dir.path().to_path_buf());
    let resumed =
        Trainer::<B>::new(create_fn(), resume_config, Default::default(), None, None).unwrap();

    assert_eq!(resumed.cumulative_timesteps(), saved_timesteps);
    assert_eq!(resumed.learner().policy().flat_params(), saved_params);
}

struct CountingSink {
    sends: Arc<AtomicUsize>,
}

impl MetricsSink for CountingSink {
    fn run_id(&self) -> &str {
        "toy-run"
    }

    fn send(&mut self, report: &Report) {
        assert!(report.contains("Timesteps Collected"));
        assert!(report.contains("Policy Entropy"));
        self.sends.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_metrics_sink_receives_each_iteration() {
    let sends = Arc::new(AtomicUsize::new(0));
    let sink = CountingSink {
        sends: Arc::clone(&sends),
    };

    let mut trainer = Trainer::<B>::new(
        create_fn(),
        small_config(),
        Default::default(),
        None,
        Some(Box::new(sink)),
    )
    .unwrap();
    trainer.learn().unwrap();

    assert!(sends.load(Ordering::Relaxed) >= 1);
}

#[test]
fn test_iteration_callback_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);

    let mut trainer =
        Trainer::<B>::new(create_fn(), small_config(), Default::default(), None, None).unwrap();
    trainer.set_iteration_callback(move |report| {
        assert!(report.contains("Total Iteration Time"));
        calls_clone.fetch_add(1, Ordering::Relaxed);
    });
    trainer.learn().unwrap();

    assert!(calls.load(Ordering::Relaxed) >= 1);
}
