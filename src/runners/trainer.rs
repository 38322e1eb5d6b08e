//! Training orchestrator.
//!
//! One iteration: collect a trajectory batch from the pool, predict values
//! and compute advantages, submit to the experience buffer, run the PPO
//! learner, then handle metrics and periodic checkpoints. The loop ends
//! when the cumulative timestep limit is reached (0 runs unbounded).
//!
//! The trainer exclusively owns the learner, the buffer, the pool, and
//! the checkpoint writer; collectors see the policy only through
//! published snapshots.

use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::algorithms::gae::compute_gae;
use crate::buffers::{BufferError, ExperienceBuffer, ExperienceTensors};
use crate::checkpoint::{CheckpointError, Checkpointer, TrainingStats};
use crate::collectors::{CollectorPool, CollectorPoolConfig};
use crate::core::{GameTrajectory, PolicyPublisher, TrajectoryError, WelfordRunningStat};
use crate::environment::{probe_env, EnvCreateFn, RenderSink};
use crate::learner::{ConfigError, DeviceKind, LearnError, PPOLearner};
use crate::metrics::{display_report, MetricsSink, Report};

use super::config::TrainerConfig;

/// Fatal trainer failure.
#[derive(Debug)]
pub enum TrainerError {
    /// Invalid configuration.
    Config(ConfigError),
    /// Checkpoint save/load failure.
    Checkpoint(CheckpointError),
    /// Learner failure.
    Learn(LearnError),
    /// Trajectory harvest/concatenation failure.
    Trajectory(TrajectoryError),
    /// Experience submission failure.
    Buffer(BufferError),
    /// A learn iteration was requested in deterministic mode.
    DeterministicLearn,
}

impl fmt::Display for TrainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainerError::Config(e) => write!(f, "Trainer: {}", e),
            TrainerError::Checkpoint(e) => write!(f, "Trainer: {}", e),
            TrainerError::Learn(e) => write!(f, "Trainer: {}", e),
            TrainerError::Trajectory(e) => write!(f, "Trainer: {}", e),
            TrainerError::Buffer(e) => write!(f, "Trainer: {}", e),
            TrainerError::DeterministicLearn => write!(
                f,
                "Trainer: cannot run a learn iteration in deterministic mode; \
                 deterministic mode is for performing, not training"
            ),
        }
    }
}

impl std::error::Error for TrainerError {}

impl From<ConfigError> for TrainerError {
    fn from(e: ConfigError) -> Self {
        TrainerError::Config(e)
    }
}

impl From<CheckpointError> for TrainerError {
    fn from(e: CheckpointError) -> Self {
        TrainerError::Checkpoint(e)
    }
}

impl From<LearnError> for TrainerError {
    fn from(e: LearnError) -> Self {
        TrainerError::Learn(e)
    }
}

impl From<TrajectoryError> for TrainerError {
    fn from(e: TrajectoryError) -> Self {
        TrainerError::Trajectory(e)
    }
}

impl From<BufferError> for TrainerError {
    fn from(e: BufferError) -> Self {
        TrainerError::Buffer(e)
    }
}

/// Per-iteration callback invoked with the assembled report.
pub type IterationCallback = Box<dyn FnMut(&Report)>;

/// Orchestrates collection, advantage computation, learning, metrics, and
/// checkpointing.
pub struct Trainer<B: AutodiffBackend> {
    config: TrainerConfig,
    learner: PPOLearner<B>,
    buffer: ExperienceBuffer<B>,
    pool: CollectorPool<B::InnerBackend>,
    checkpointer: Option<Checkpointer>,
    metrics_sink: Option<Box<dyn MetricsSink>>,
    return_stats: WelfordRunningStat,
    obs_size: usize,
    action_count: usize,
    cumulative_timesteps: u64,
    total_epochs: u64,
    skill_rating: Option<f64>,
    run_id: Option<String>,
    iteration_callback: Option<IterationCallback>,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Build the full training stack: probe the environment, create the
    /// learner, buffer, and collector pool, and resume from the newest
    /// checkpoint when a load folder is configured.
    pub fn new(
        create_fn: EnvCreateFn,
        config: TrainerConfig,
        device: B::Device,
        render_sink: Option<Box<dyn RenderSink>>,
        metrics_sink: Option<Box<dyn MetricsSink>>,
    ) -> Result<Self, TrainerError> {
        let config = config.normalized();
        config.validate()?;

        let probe = probe_env(&create_fn);
        log::info!(
            "Trainer: probed environment (obs_size={}, action_count={})",
            probe.obs_size,
            probe.action_count
        );

        let publisher = Arc::new(PolicyPublisher::new());

        let mut learner = PPOLearner::new(
            probe.obs_size,
            probe.action_count,
            config.ppo.clone(),
            device.clone(),
            Arc::clone(&publisher),
        )?;

        let buffer =
            ExperienceBuffer::new(config.exp_buffer_size, config.random_seed, device.clone());

        let pool_config = CollectorPoolConfig {
            worker_count: config.worker_count,
            games_per_worker: config.games_per_worker,
            max_collect: (config.timesteps_per_iteration as f64 * 1.5) as u64,
            deterministic: config.deterministic,
            block_concurrent_infer: config.block_concurrent_infer,
            render_during_training: config.render_during_training,
            render_time_scale: config.render_time_scale,
            rng_seed: config.random_seed,
        };
        let mut pool = CollectorPool::new(pool_config, publisher);
        pool.create_workers(&create_fn, device.clone(), render_sink);

        let mut return_stats = WelfordRunningStat::new(1);
        let mut cumulative_timesteps = 0;
        let mut total_epochs = 0;
        let mut skill_rating = None;
        let mut run_id = None;

        if let Some(load_folder) = &config.checkpoint_load_folder {
            let loader = Checkpointer::new(load_folder, config.checkpoints_to_keep);
            if let Some(stats) = loader.load(&mut learner)? {
                cumulative_timesteps = stats.cumulative_timesteps;
                total_epochs = stats.epoch;
                return_stats = stats.reward_running_stats;
                skill_rating = stats.skill_rating;
                run_id = stats.run_id;
            }
        }

        let checkpointer = config
            .checkpoint_save_folder
            .as_ref()
            .map(|folder| Checkpointer::new(folder, config.checkpoints_to_keep));

        if let Some(sink) = &metrics_sink {
            run_id = Some(sink.run_id().to_string());
        }

        Ok(Self {
            config,
            learner,
            buffer,
            pool,
            checkpointer,
            metrics_sink,
            return_stats,
            obs_size: probe.obs_size,
            action_count: probe.action_count,
            cumulative_timesteps,
            total_epochs,
            skill_rating,
            run_id,
            iteration_callback: None,
        })
    }

    /// Observation vector length probed at construction.
    pub fn obs_size(&self) -> usize {
        self.obs_size
    }

    /// Discrete action space size probed at construction.
    pub fn action_count(&self) -> usize {
        self.action_count
    }

    /// Total environment timesteps consumed.
    pub fn cumulative_timesteps(&self) -> u64 {
        self.cumulative_timesteps
    }

    /// The learner (for inspection and LR updates).
    pub fn learner(&self) -> &PPOLearner<B> {
        &self.learner
    }

    /// Change both learning rates at runtime.
    pub fn update_learning_rates(&mut self, policy_lr: f64, critic_lr: f64) {
        self.learner.update_learning_rates(policy_lr, critic_lr);
    }

    /// Install a per-iteration report callback.
    pub fn set_iteration_callback(&mut self, callback: impl FnMut(&Report) + 'static) {
        self.iteration_callback = Some(Box::new(callback));
    }

    /// Run the training loop until the timestep limit or a fatal error.
    pub fn learn(&mut self) -> Result<(), TrainerError> {
        self.pool.start();
        let result = self.run_loop();
        self.pool.stop();
        result
    }

    fn run_loop(&mut self) -> Result<(), TrainerError> {
        let mut ts_since_save: u64 = 0;
        let mut epoch_timer = Instant::now();

        while self.config.timestep_limit == 0
            || self.cumulative_timesteps < self.config.timestep_limit
        {
            let mut report = Report::new();

            let trajectory = self.pool.collect(self.config.timesteps_per_iteration)?;
            let collection_time = epoch_timer.elapsed().as_secs_f64();
            let collected = trajectory.len as u64;
            self.cumulative_timesteps += collected;

            if self.config.ppo.policy_lr == 0.0 && self.config.ppo.critic_lr == 0.0 {
                // Collection-only run: no learning, no housekeeping.
                continue;
            }

            if self.config.deterministic {
                return Err(TrainerError::DeterministicLearn);
            }

            if !self.config.collection_during_learn {
                self.pool.set_collection_disabled(true);
            }

            self.add_new_experience(trajectory, &mut report)?;

            let block_infer_during_learn = self.config.collection_during_learn
                && self.config.ppo.device_kind == DeviceKind::Accelerator;
            if block_infer_during_learn {
                self.pool.set_collection_disabled(true);
            }

            let ppo_learn_timer = Instant::now();
            self.learner.learn(&mut self.buffer, &mut report)?;
            let ppo_learn_time = ppo_learn_timer.elapsed().as_secs_f64();

            if block_infer_during_learn {
                self.pool.set_collection_disabled(false);
            }
            self.total_epochs += self.config.ppo.epochs as u64;

            let epoch_time = epoch_timer.elapsed().as_secs_f64();
            epoch_timer = Instant::now();
            let consumption_time = epoch_time - collection_time;

            self.pool.get_metrics(&mut report);

            if !self.config.collection_during_learn {
                self.pool.set_collection_disabled(false);
            }

            let mut true_collection_time = if self.config.collection_during_learn {
                self.pool.last_iteration_time()
            } else {
                collection_time
            };
            if block_infer_during_learn {
                true_collection_time -= ppo_learn_time;
            }
            true_collection_time = true_collection_time.max(collection_time);
            let true_epoch_time = epoch_time.max(true_collection_time);

            report.set("Total Iteration Time", epoch_time);
            report.set("Collection Time", collection_time);
            report.set("Consumption Time", consumption_time);
            report.set(
                "Collect-Consume Overlap Time",
                true_collection_time - collection_time,
            );
            report.set(
                "Collected Steps/Second",
                (collected as f64 / true_collection_time.max(1e-9)).floor(),
            );
            report.set(
                "Overall Steps/Second",
                (collected as f64 / true_epoch_time.max(1e-9)).floor(),
            );
            report.set("Timesteps Collected", collected as f64);
            report.set("Cumulative Timesteps", self.cumulative_timesteps as f64);

            if let Some(callback) = &mut self.iteration_callback {
                callback(&report);
            }

            log::info!("============================================");
            log::info!("ITERATION COMPLETED:");
            display_report(&report);
            log::info!("============================================");

            if let Some(sink) = &mut self.metrics_sink {
                sink.send(&report);
            }

            ts_since_save += collected;
            if ts_since_save > self.config.timesteps_per_save && self.checkpointer.is_some() {
                self.save()?;
                ts_since_save = 0;
            }

            self.pool.reset_metrics();
        }

        Ok(())
    }

    /// Predict values, compute advantages, update return statistics, and
    /// submit the batch to the experience buffer.
    fn add_new_experience(
        &mut self,
        trajectory: GameTrajectory,
        report: &mut Report,
    ) -> Result<(), TrainerError> {
        let count = trajectory.len;
        if count == 0 {
            return Ok(());
        }

        let obs_size = trajectory.obs_size;
        let mini = self.learner.config().effective_mini_batch_size().max(1);
        let device = self.buffer.device().clone();
        let value_net = self.learner.value_net().valid();

        // One prediction per state plus one for the final next-state.
        let val_pred_count = count + 1;
        let mut val_preds: Vec<f32> = Vec::with_capacity(val_pred_count);

        let mut start = 0;
        while start < val_pred_count {
            let end = (start + mini).min(val_pred_count);
            let slice_end = end.min(count);

            let mut rows = trajectory.states[start * obs_size..slice_end * obs_size].to_vec();
            let mut row_count = slice_end - start;
            if end == val_pred_count {
                rows.extend_from_slice(
                    &trajectory.next_states[(count - 1) * obs_size..count * obs_size],
                );
                row_count += 1;
            }

            let states = Tensor::<B::InnerBackend, 1>::from_floats(rows.as_slice(), &device)
                .reshape([row_count, obs_size]);
            let predictions = value_net.forward(states);
            val_preds.extend(
                predictions
                    .into_data()
                    .convert::<f32>()
                    .to_vec::<f32>()
                    .expect("value prediction data"),
            );

            start = end;
        }

        let ret_std = if self.config.standardize_returns {
            self.return_stats.std()[0] as f32
        } else {
            1.0
        };

        let gae = compute_gae(
            &trajectory.rewards,
            &trajectory.dones,
            &trajectory.truncateds,
            &val_preds,
            self.config.gae_gamma,
            self.config.gae_lambda,
            ret_std,
            self.config.reward_clip_range,
        );

        let n = count as f64;
        let avg_return =
            gae.returns.iter().map(|&r| r.abs() as f64).sum::<f64>() / n / ret_std as f64;
        let avg_advantage = gae.advantages.iter().map(|&a| a.abs() as f64).sum::<f64>() / n;
        let avg_val_target = gae.value_targets.iter().map(|&v| v.abs() as f64).sum::<f64>() / n;
        report.set("Avg Return", avg_return);
        report.set("Avg Advantage", avg_advantage);
        report.set("Avg Val Target", avg_val_target);

        if self.config.standardize_returns {
            self.return_stats
                .increment(&gae.returns, self.config.max_returns_per_stats_inc);
        }

        let experience = ExperienceTensors::from_trajectory(
            &trajectory,
            &gae.value_targets,
            &gae.advantages,
            &device,
        );
        self.buffer.submit(experience)?;

        Ok(())
    }

    /// Write a checkpoint for the current cumulative timestep count.
    pub fn save(&mut self) -> Result<(), TrainerError> {
        let Some(checkpointer) = &self.checkpointer else {
            return Err(TrainerError::Checkpoint(CheckpointError::NoSaveFolder));
        };

        let stats = TrainingStats {
            cumulative_timesteps: self.cumulative_timesteps,
            cumulative_model_updates: self.learner.cumulative_model_updates(),
            epoch: self.total_epochs,
            reward_running_stats: self.return_stats.clone(),
            skill_rating: self.skill_rating,
            run_id: self.run_id.clone(),
        };
        checkpointer.save(&self.learner, &stats)?;
        Ok(())
    }
}
