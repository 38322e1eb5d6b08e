//! PPO learner: clipped-surrogate policy updates with mini-batch gradient
//! accumulation.
//!
//! Each optimizer batch is split into mini-batches whose losses are scaled
//! by `rows / batch_size`, so the accumulated gradients match a single
//! full-batch pass. Every mini-batch runs forward and backward on a
//! **parameter replica** (a cheap `Module::clone` sharing parameter ids)
//! and hands its `GradientsParams` back to the calling thread, which
//! reduces them into one `GradientsAccumulator` and takes a single Adam
//! step per batch. On CPU the replicas run concurrently on scoped threads;
//! on an accelerator they run sequentially on the calling thread. Report
//! metrics ride the join path, so mini-batch workers share no mutable
//! state.
//!
//! After every optimizer step the learner publishes a fresh inference
//! snapshot for the collector workers, optionally quantized through f16.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::{AutodiffModule, Module};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsAccumulator, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::algorithms::policy_loss::{clip_fraction, ppo_clip_loss, sb3_kl_divergence, value_mse};
use crate::buffers::{ExperienceBuffer, SampleSet};
use crate::checkpoint::CheckpointError;
use crate::core::PolicyPublisher;
use crate::metrics::Report;
use crate::nn::{DiscretePolicy, ValueEstimator};
use crate::nn::{
    half_round_trip, layers_grad_norm, layers_scale_grads, param_update_magnitude, to_f32_vec,
};

use super::config::{ConfigError, DeviceKind, PPOLearnerConfig};
use super::grad_noise::GradNoiseTracker;
use super::grad_scaler::GradScaler;

/// Gradient-norm clip applied to both networks at every step.
const GRAD_CLIP_NORM: f32 = 0.5;

/// On-disk base names inside a checkpoint directory. The recorder appends
/// its own `.bin` extension.
pub(crate) const POLICY_FILE: &str = "PPO_POLICY";
pub(crate) const CRITIC_FILE: &str = "PPO_CRITIC";
pub(crate) const POLICY_OPTIM_FILE: &str = "PPO_POLICY_OPTIM";
pub(crate) const CRITIC_OPTIM_FILE: &str = "PPO_CRITIC_OPTIM";

type PolicyOptim<B> = OptimizerAdaptor<Adam, DiscretePolicy<B>, B>;
type ValueOptim<B> = OptimizerAdaptor<Adam, ValueEstimator<B>, B>;

/// Fatal failure inside a learn iteration.
#[derive(Debug)]
pub enum LearnError {
    /// A mini-batch worker thread panicked (backend failure).
    WorkerPanicked,
}

impl fmt::Display for LearnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearnError::WorkerPanicked => {
                write!(f, "PPOLearner: mini-batch worker panicked during learn")
            }
        }
    }
}

impl std::error::Error for LearnError {}

/// PPO learner owning both networks and their optimizers.
pub struct PPOLearner<B: AutodiffBackend> {
    config: PPOLearnerConfig,
    device: B::Device,
    policy: DiscretePolicy<B>,
    value_net: ValueEstimator<B>,
    policy_optim: PolicyOptim<B>,
    value_optim: ValueOptim<B>,
    publisher: Arc<PolicyPublisher<DiscretePolicy<B::InnerBackend>>>,
    grad_scaler: Option<GradScaler>,
    noise_tracker_policy: Option<GradNoiseTracker>,
    noise_tracker_value: Option<GradNoiseTracker>,
    thread_count: usize,
    cumulative_model_updates: u64,
}

impl<B: AutodiffBackend> PPOLearner<B> {
    /// Create a learner for the given observation/action sizes.
    ///
    /// Fails on any configuration error; publishes the initial policy
    /// snapshot on success.
    pub fn new(
        obs_size: usize,
        action_count: usize,
        config: PPOLearnerConfig,
        device: B::Device,
        publisher: Arc<PolicyPublisher<DiscretePolicy<B::InnerBackend>>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let policy = DiscretePolicy::new(
            obs_size,
            action_count,
            &config.policy_layer_sizes,
            config.policy_temperature,
            &device,
        );
        let value_net = ValueEstimator::new(obs_size, &config.critic_layer_sizes, &device);

        let policy_optim = Self::adam_config().init();
        let value_optim = Self::adam_config().init();

        let grad_scaler = config.autocast_learn.then(GradScaler::new);
        let (noise_tracker_policy, noise_tracker_value) = if config.measure_gradient_noise {
            let make = || {
                GradNoiseTracker::new(
                    config.batch_size,
                    config.gradient_noise_update_interval,
                    config.gradient_noise_avg_decay,
                )
            };
            (Some(make()), Some(make()))
        } else {
            (None, None)
        };

        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let thread_count = cores + cores / 2;

        let learner = Self {
            config,
            device,
            policy,
            value_net,
            policy_optim,
            value_optim,
            publisher,
            grad_scaler,
            noise_tracker_policy,
            noise_tracker_value,
            thread_count,
            cumulative_model_updates: 0,
        };
        learner.publish_snapshot();
        Ok(learner)
    }

    fn adam_config() -> AdamConfig {
        AdamConfig::new().with_grad_clipping(Some(GradientClippingConfig::Norm(GRAD_CLIP_NORM)))
    }

    /// Current policy network.
    pub fn policy(&self) -> &DiscretePolicy<B> {
        &self.policy
    }

    /// Current value network.
    pub fn value_net(&self) -> &ValueEstimator<B> {
        &self.value_net
    }

    /// Learner configuration.
    pub fn config(&self) -> &PPOLearnerConfig {
        &self.config
    }

    /// Optimizer batches applied since construction or restore.
    pub fn cumulative_model_updates(&self) -> u64 {
        self.cumulative_model_updates
    }

    /// Restore the update counter from checkpoint stats.
    pub fn set_cumulative_model_updates(&mut self, updates: u64) {
        self.cumulative_model_updates = updates;
    }

    /// Change both learning rates at runtime. A zero rate freezes the
    /// corresponding network.
    pub fn update_learning_rates(&mut self, policy_lr: f64, critic_lr: f64) {
        self.config.policy_lr = policy_lr;
        self.config.critic_lr = critic_lr;
        log::info!(
            "PPOLearner: updated learning rates to [{:e}, {:e}]",
            policy_lr,
            critic_lr
        );
    }

    /// Publish the current policy as a collector inference snapshot.
    pub fn publish_snapshot(&self) {
        let mut snapshot = self.policy.valid();
        if self.config.half_prec_models {
            snapshot = snapshot.half_precision();
        }
        self.publisher.publish(&snapshot);
    }

    /// Run `epochs` passes of shuffled batches from the buffer and apply
    /// gradient updates, filling `report` with iteration metrics.
    pub fn learn(
        &mut self,
        buffer: &mut ExperienceBuffer<B>,
        report: &mut Report,
    ) -> Result<(), LearnError> {
        let train_policy = self.config.policy_lr != 0.0;
        let train_critic = self.config.critic_lr != 0.0;

        let policy_before = self.policy.flat_params();
        let critic_before = self.value_net.flat_params();

        let mut num_batches: u64 = 0;
        let mut num_minibatches: u64 = 0;
        let mut mean_entropy = 0.0f64;
        let mut mean_kl = 0.0f64;
        let mut mean_val_loss = 0.0f64;
        let mut mean_ratio = 0.0f64;
        let mut clip_fractions: Vec<f32> = Vec::new();

        let total_timer = Instant::now();

        for _epoch in 0..self.config.epochs {
            for batch in buffer.shuffled_batches(self.config.batch_size) {
                let outcomes = self.consume_batch(&batch, train_policy, train_critic)?;

                let mut policy_acc: GradientsAccumulator<DiscretePolicy<B>> =
                    GradientsAccumulator::new();
                let mut value_acc: GradientsAccumulator<ValueEstimator<B>> =
                    GradientsAccumulator::new();
                let mut policy_small_norms: Vec<f32> = Vec::new();
                let mut value_small_norms: Vec<f32> = Vec::new();
                let track_noise = self.noise_tracker_policy.is_some();

                for outcome in outcomes {
                    if let Some(grads) = outcome.policy_grads {
                        if track_noise {
                            policy_small_norms
                                .push(layers_grad_norm(self.policy.layers(), &grads));
                        }
                        policy_acc.accumulate(&self.policy, grads);
                    }
                    if let Some(grads) = outcome.value_grads {
                        if track_noise {
                            value_small_norms
                                .push(layers_grad_norm(self.value_net.layers(), &grads));
                        }
                        value_acc.accumulate(&self.value_net, grads);
                    }

                    mean_entropy += outcome.entropy as f64;
                    mean_kl += outcome.kl as f64;
                    mean_val_loss += outcome.value_loss as f64;
                    mean_ratio += outcome.mean_ratio as f64;
                    if train_policy {
                        clip_fractions.push(outcome.clip_fraction);
                    }
                    report.accum("PPO Value Estimate Time", outcome.value_time);
                    report.accum("PPO Backprop Data Time", outcome.backprop_time);
                    report.accum("PPO Gradient Time", outcome.gradient_time);
                    num_minibatches += 1;
                }

                let mut policy_grads = policy_acc.grads();
                let mut value_grads = value_acc.grads();

                let mini_rows = self.mini_batch_rows(batch_rows(&batch));
                if let Some(tracker) = &mut self.noise_tracker_policy {
                    if train_policy {
                        let big = layers_grad_norm(self.policy.layers(), &policy_grads);
                        tracker.update(&policy_small_norms, mini_rows, big);
                    }
                }
                if let Some(tracker) = &mut self.noise_tracker_value {
                    if train_critic {
                        let big = layers_grad_norm(self.value_net.layers(), &value_grads);
                        tracker.update(&value_small_norms, mini_rows, big);
                    }
                }

                let mut apply_step = true;
                if let Some(scaler) = &mut self.grad_scaler {
                    let factor = scaler.unscale_factor();
                    policy_grads = layers_scale_grads(self.policy.layers(), policy_grads, factor);
                    value_grads =
                        layers_scale_grads(self.value_net.layers(), value_grads, factor);

                    let finite = layers_grad_norm(self.policy.layers(), &policy_grads)
                        .is_finite()
                        && layers_grad_norm(self.value_net.layers(), &value_grads).is_finite();
                    apply_step = scaler.update(finite);
                    if !apply_step {
                        log::warn!(
                            "PPOLearner: non-finite gradients, skipping step and backing off loss scale"
                        );
                    }
                }

                if apply_step {
                    if train_policy {
                        self.policy = self.policy_optim.step(
                            self.config.policy_lr,
                            self.policy.clone(),
                            policy_grads,
                        );
                    }
                    if train_critic {
                        self.value_net = self.value_optim.step(
                            self.config.critic_lr,
                            self.value_net.clone(),
                            value_grads,
                        );
                    }
                }

                self.publish_snapshot();
                num_batches += 1;
            }
        }

        let total_time = total_timer.elapsed().as_secs_f64();
        let nb = num_batches.max(1) as f64;
        let nmb = num_minibatches.max(1) as f64;

        let mean_clip = if clip_fractions.is_empty() {
            0.0
        } else {
            clip_fractions.iter().map(|&f| f as f64).sum::<f64>() / clip_fractions.len() as f64
        };

        self.cumulative_model_updates += num_batches;

        report.set("PPO Batch Consumption Time", total_time / nb);
        report.set(
            "Cumulative Model Updates",
            self.cumulative_model_updates as f64,
        );
        report.set("Policy Entropy", mean_entropy / nmb);
        report.set("Mean KL Divergence", mean_kl / nmb);
        report.set("Mean Ratio", mean_ratio / nmb);
        report.set("Value Function Loss", mean_val_loss / nmb);
        report.set("SB3 Clip Fraction", mean_clip);
        report.set(
            "Policy Update Magnitude",
            param_update_magnitude(&policy_before, &self.policy.flat_params()) as f64,
        );
        report.set(
            "Value Function Update Magnitude",
            param_update_magnitude(&critic_before, &self.value_net.flat_params()) as f64,
        );
        report.set("PPO Learn Time", total_time);

        if let Some(tracker) = &self.noise_tracker_policy {
            if tracker.noise_scale() != 0.0 {
                report.set("Grad Noise Policy", tracker.noise_scale());
            }
        }
        if let Some(tracker) = &self.noise_tracker_value {
            if tracker.noise_scale() != 0.0 {
                report.set("Grad Noise Value Net", tracker.noise_scale());
            }
        }

        Ok(())
    }

    /// Rows per mini-batch for the active dispatch strategy.
    fn mini_batch_rows(&self, batch_rows: usize) -> usize {
        match self.config.device_kind {
            DeviceKind::Accelerator => self.config.effective_mini_batch_size(),
            DeviceKind::Cpu => (batch_rows / self.thread_count).max(1),
        }
    }

    /// Run every mini-batch of one optimizer batch, returning their
    /// gradients and metrics.
    fn consume_batch(
        &self,
        batch: &SampleSet<B>,
        train_policy: bool,
        train_critic: bool,
    ) -> Result<Vec<MiniBatchOutcome>, LearnError> {
        let rows = batch_rows(batch);
        let step = self.mini_batch_rows(rows);

        let params = MiniBatchParams {
            clip_range: self.config.clip_range,
            ent_coef: self.config.ent_coef,
            train_policy,
            train_critic,
            loss_multiplier: self.grad_scaler.as_ref().map_or(1.0, |s| s.scale()),
        };

        let mut inputs = Vec::with_capacity(rows.div_ceil(step));
        let mut start = 0;
        while start < rows {
            let stop = (start + step).min(rows);
            inputs.push(self.minibatch_input(batch, start, stop, rows));
            start = stop;
        }

        match self.config.device_kind {
            DeviceKind::Accelerator => Ok(inputs
                .into_iter()
                .map(|input| {
                    run_minibatch(self.policy.clone(), self.value_net.clone(), input, params)
                })
                .collect()),
            DeviceKind::Cpu => self.run_minibatches_parallel(inputs, params),
        }
    }

    /// Spread mini-batch replicas over scoped worker threads, in waves of
    /// at most `thread_count`.
    fn run_minibatches_parallel(
        &self,
        inputs: Vec<MiniBatchInput<B>>,
        params: MiniBatchParams,
    ) -> Result<Vec<MiniBatchOutcome>, LearnError> {
        let mut outcomes = Vec::with_capacity(inputs.len());
        let mut queue = inputs.into_iter();

        loop {
            let wave: Vec<MiniBatchInput<B>> = queue.by_ref().take(self.thread_count).collect();
            if wave.is_empty() {
                break;
            }

            std::thread::scope(|scope| -> Result<(), LearnError> {
                let handles: Vec<_> = wave
                    .into_iter()
                    .map(|input| {
                        let policy = self.policy.clone();
                        let value_net = self.value_net.clone();
                        scope.spawn(move || run_minibatch(policy, value_net, input, params))
                    })
                    .collect();

                for handle in handles {
                    match handle.join() {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(_) => return Err(LearnError::WorkerPanicked),
                    }
                }
                Ok(())
            })?;
        }

        Ok(outcomes)
    }

    /// Slice one mini-batch out of a sample set.
    fn minibatch_input(
        &self,
        batch: &SampleSet<B>,
        start: usize,
        stop: usize,
        batch_rows: usize,
    ) -> MiniBatchInput<B> {
        let actions: Vec<u32> = batch
            .actions
            .clone()
            .slice([start..stop])
            .into_data()
            .convert::<i32>()
            .to_vec::<i32>()
            .expect("action tensor data")
            .into_iter()
            .map(|a| a as u32)
            .collect();

        let mut obs = batch.states.clone().slice([start..stop]);
        if self.config.autocast_learn {
            obs = half_round_trip(obs);
        }

        MiniBatchInput {
            obs,
            actions,
            old_log_probs: batch.log_probs.clone().slice([start..stop]),
            advantages: batch.advantages.clone().slice([start..stop]),
            target_values: batch.values.clone().slice([start..stop]),
            loss_scale: (stop - start) as f32 / batch_rows as f32,
        }
    }

    /// Write both models and both optimizer states into `folder`.
    pub fn save_to(&self, folder: &Path) -> Result<(), CheckpointError> {
        log::info!("PPOLearner: saving models to {}", folder.display());
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

        self.policy
            .clone()
            .save_file(folder.join(POLICY_FILE), &recorder)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        self.value_net
            .clone()
            .save_file(folder.join(CRITIC_FILE), &recorder)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;

        recorder
            .record(self.policy_optim.to_record(), folder.join(POLICY_OPTIM_FILE))
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        recorder
            .record(self.value_optim.to_record(), folder.join(CRITIC_OPTIM_FILE))
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;

        Ok(())
    }

    /// Restore both models and, when present, both optimizer states from
    /// `folder`.
    ///
    /// Missing or empty optimizer files log a warning and reset the
    /// optimizer; everything else on the load path is fatal. Parameter
    /// element counts are verified against the current architecture.
    pub fn load_from(&mut self, folder: &Path) -> Result<(), CheckpointError> {
        log::info!("PPOLearner: loading models from {}", folder.display());
        if !folder.is_dir() {
            return Err(CheckpointError::NotADirectory(folder.to_path_buf()));
        }

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

        let policy_path = folder.join(POLICY_FILE).with_extension("bin");
        if !policy_path.exists() {
            return Err(CheckpointError::MissingModelFile(policy_path));
        }

        let expected = self.policy.param_sizes();
        let loaded = self
            .policy
            .clone()
            .load_file(folder.join(POLICY_FILE), &recorder, &self.device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
        let found = loaded.param_sizes();
        if expected != found {
            return Err(CheckpointError::ShapeMismatch {
                current: expected,
                saved: found,
            });
        }
        self.policy = loaded;

        let critic_path = folder.join(CRITIC_FILE).with_extension("bin");
        if critic_path.exists() {
            let expected = self.value_net.param_sizes();
            let loaded = self
                .value_net
                .clone()
                .load_file(folder.join(CRITIC_FILE), &recorder, &self.device)
                .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
            let found = loaded.param_sizes();
            if expected != found {
                return Err(CheckpointError::ShapeMismatch {
                    current: expected,
                    saved: found,
                });
            }
            self.value_net = loaded;
        }

        self.load_policy_optimizer(folder, &recorder)?;
        self.load_value_optimizer(folder, &recorder)?;

        self.publish_snapshot();
        Ok(())
    }

    fn load_policy_optimizer(
        &mut self,
        folder: &Path,
        recorder: &BinFileRecorder<FullPrecisionSettings>,
    ) -> Result<(), CheckpointError> {
        match optimizer_state_status(folder, POLICY_OPTIM_FILE)? {
            OptimizerState::Missing(path) => {
                log::warn!(
                    "PPOLearner: no optimizer state at {}, optimizer will be reset",
                    path.display()
                );
                self.policy_optim = Self::adam_config().init();
            }
            OptimizerState::Present => {
                let record = recorder
                    .load(folder.join(POLICY_OPTIM_FILE), &self.device)
                    .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
                self.policy_optim = Self::adam_config().init::<B, DiscretePolicy<B>>().load_record(record);
            }
        }
        Ok(())
    }

    fn load_value_optimizer(
        &mut self,
        folder: &Path,
        recorder: &BinFileRecorder<FullPrecisionSettings>,
    ) -> Result<(), CheckpointError> {
        match optimizer_state_status(folder, CRITIC_OPTIM_FILE)? {
            OptimizerState::Missing(path) => {
                log::warn!(
                    "PPOLearner: no optimizer state at {}, optimizer will be reset",
                    path.display()
                );
                self.value_optim = Self::adam_config().init();
            }
            OptimizerState::Present => {
                let record = recorder
                    .load(folder.join(CRITIC_OPTIM_FILE), &self.device)
                    .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
                self.value_optim = Self::adam_config().init::<B, ValueEstimator<B>>().load_record(record);
            }
        }
        Ok(())
    }
}

enum OptimizerState {
    Missing(std::path::PathBuf),
    Present,
}

/// Missing or empty optimizer files are recoverable (the optimizer
/// resets); any other filesystem failure is fatal.
fn optimizer_state_status(folder: &Path, base: &str) -> Result<OptimizerState, CheckpointError> {
    let path = folder.join(base).with_extension("bin");
    if !path.exists() {
        return Ok(OptimizerState::Missing(path));
    }
    let len = std::fs::metadata(&path).map_err(CheckpointError::Io)?.len();
    if len == 0 {
        return Ok(OptimizerState::Missing(path));
    }
    Ok(OptimizerState::Present)
}

fn batch_rows<B: AutodiffBackend>(batch: &SampleSet<B>) -> usize {
    batch.states.dims()[0]
}

/// Per-mini-batch hyperparameters.
#[derive(Debug, Clone, Copy)]
struct MiniBatchParams {
    clip_range: f32,
    ent_coef: f32,
    train_policy: bool,
    train_critic: bool,
    loss_multiplier: f32,
}

/// Tensors for one mini-batch, sliced on the dispatching thread.
struct MiniBatchInput<B: AutodiffBackend> {
    obs: Tensor<B, 2>,
    actions: Vec<u32>,
    old_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    target_values: Tensor<B, 1>,
    loss_scale: f32,
}

/// Gradients and metrics from one mini-batch replica.
#[derive(Default)]
struct MiniBatchOutcome {
    policy_grads: Option<GradientsParams>,
    value_grads: Option<GradientsParams>,
    entropy: f32,
    kl: f32,
    mean_ratio: f32,
    clip_fraction: f32,
    value_loss: f32,
    value_time: f64,
    backprop_time: f64,
    gradient_time: f64,
}

fn scalar<B: AutodiffBackend>(tensor: Tensor<B, 1>) -> f32 {
    to_f32_vec(tensor)[0]
}

/// Forward and backward for one mini-batch on parameter replicas.
fn run_minibatch<B: AutodiffBackend>(
    policy: DiscretePolicy<B>,
    value_net: ValueEstimator<B>,
    input: MiniBatchInput<B>,
    params: MiniBatchParams,
) -> MiniBatchOutcome {
    let MiniBatchInput {
        obs,
        actions,
        old_log_probs,
        advantages,
        target_values,
        loss_scale,
    } = input;

    let mut outcome = MiniBatchOutcome::default();
    let scale = loss_scale * params.loss_multiplier;

    let value_timer = Instant::now();
    let value_loss = if params.train_critic {
        let values = value_net.forward(obs.clone());
        let mse = value_mse(values, target_values);
        outcome.value_loss = scalar(mse.clone());
        Some(mse.mul_scalar(scale))
    } else {
        None
    };
    outcome.value_time = value_timer.elapsed().as_secs_f64();

    let backprop_timer = Instant::now();
    let policy_loss = if params.train_policy {
        let bp = policy.get_backprop_data(obs, &actions);
        outcome.entropy = scalar(bp.entropy.clone());

        let log_ratios =
            to_f32_vec(bp.action_log_probs.clone() - old_log_probs.clone());
        let ratios: Vec<f32> = log_ratios
            .iter()
            .map(|&lr| lr.clamp(-20.0, 20.0).exp())
            .collect();
        outcome.mean_ratio = ratios.iter().sum::<f32>() / ratios.len().max(1) as f32;
        outcome.kl = sb3_kl_divergence(&log_ratios);
        outcome.clip_fraction = clip_fraction(&ratios, params.clip_range);

        let surrogate = ppo_clip_loss(
            bp.action_log_probs,
            old_log_probs,
            advantages,
            params.clip_range,
        );
        Some((surrogate - bp.entropy.mul_scalar(params.ent_coef)).mul_scalar(scale))
    } else {
        None
    };
    outcome.backprop_time = backprop_timer.elapsed().as_secs_f64();

    let gradient_timer = Instant::now();
    if let Some(loss) = policy_loss {
        let grads = loss.backward();
        outcome.policy_grads = Some(GradientsParams::from_grads(grads, &policy));
    }
    if let Some(loss) = value_loss {
        let grads = loss.backward();
        outcome.value_grads = Some(GradientsParams::from_grads(grads, &value_net));
    }
    outcome.gradient_time = gradient_timer.elapsed().as_secs_f64();

    outcome
}
