//! PPO learner configuration.

use std::fmt;

/// Device class the learner runs on.
///
/// The class picks the mini-batch dispatch strategy: CPU devices spread
/// mini-batches over a thread pool, accelerator devices accumulate
/// sequentially on the calling thread and may use mixed precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Host CPU.
    Cpu,
    /// GPU or other accelerator.
    Accelerator,
}

/// Configuration for [`super::PPOLearner`].
#[derive(Debug, Clone)]
pub struct PPOLearnerConfig {
    /// Passes over the buffer per learn call.
    pub epochs: usize,
    /// Timesteps per optimizer batch.
    pub batch_size: usize,
    /// Timesteps per gradient-accumulation chunk; 0 means `batch_size`.
    /// Must divide `batch_size`.
    pub mini_batch_size: usize,
    /// PPO surrogate clip ε.
    pub clip_range: f32,
    /// Entropy bonus coefficient.
    pub ent_coef: f32,
    /// Policy learning rate; 0 freezes the policy.
    pub policy_lr: f64,
    /// Critic learning rate; 0 freezes the critic.
    pub critic_lr: f64,
    /// Hidden layer widths of the policy MLP.
    pub policy_layer_sizes: Vec<usize>,
    /// Hidden layer widths of the critic MLP.
    pub critic_layer_sizes: Vec<usize>,
    /// Softmax temperature applied to policy logits.
    pub policy_temperature: f32,
    /// Publish collector snapshots with parameters quantized through f16.
    pub half_prec_models: bool,
    /// Mixed-precision learning with loss scaling; accelerator only.
    pub autocast_learn: bool,
    /// Track the gradient noise scale.
    pub measure_gradient_noise: bool,
    /// Optimizer steps between noise-scale refreshes.
    pub gradient_noise_update_interval: usize,
    /// EMA decay for the noise-scale estimators.
    pub gradient_noise_avg_decay: f64,
    /// Device class (see [`DeviceKind`]).
    pub device_kind: DeviceKind,
}

impl Default for PPOLearnerConfig {
    fn default() -> Self {
        Self {
            epochs: 3,
            batch_size: 50_000,
            mini_batch_size: 0,
            clip_range: 0.2,
            ent_coef: 0.005,
            policy_lr: 3e-4,
            critic_lr: 3e-4,
            policy_layer_sizes: vec![256, 256, 256],
            critic_layer_sizes: vec![256, 256, 256],
            policy_temperature: 1.0,
            half_prec_models: false,
            autocast_learn: false,
            measure_gradient_noise: false,
            gradient_noise_update_interval: 10,
            gradient_noise_avg_decay: 0.9925,
            device_kind: DeviceKind::Cpu,
        }
    }
}

impl PPOLearnerConfig {
    /// Set epoch count.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set mini-batch size.
    pub fn with_mini_batch_size(mut self, mini_batch_size: usize) -> Self {
        self.mini_batch_size = mini_batch_size;
        self
    }

    /// Set surrogate clip range.
    pub fn with_clip_range(mut self, clip_range: f32) -> Self {
        self.clip_range = clip_range;
        self
    }

    /// Set entropy coefficient.
    pub fn with_ent_coef(mut self, ent_coef: f32) -> Self {
        self.ent_coef = ent_coef;
        self
    }

    /// Set both learning rates.
    pub fn with_learning_rates(mut self, policy_lr: f64, critic_lr: f64) -> Self {
        self.policy_lr = policy_lr;
        self.critic_lr = critic_lr;
        self
    }

    /// Set policy hidden layer widths.
    pub fn with_policy_layer_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.policy_layer_sizes = sizes;
        self
    }

    /// Set critic hidden layer widths.
    pub fn with_critic_layer_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.critic_layer_sizes = sizes;
        self
    }

    /// Set the device class.
    pub fn with_device_kind(mut self, device_kind: DeviceKind) -> Self {
        self.device_kind = device_kind;
        self
    }

    /// Mini-batch size with the `0 => batch_size` default applied.
    pub fn effective_mini_batch_size(&self) -> usize {
        if self.mini_batch_size == 0 {
            self.batch_size
        } else {
            self.mini_batch_size
        }
    }

    /// Validate the configuration. All failures are fatal at construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        let mini = self.effective_mini_batch_size();
        if self.batch_size % mini != 0 {
            return Err(ConfigError::MiniBatchMustDivide {
                batch_size: self.batch_size,
                mini_batch_size: mini,
            });
        }
        if self.autocast_learn && self.device_kind == DeviceKind::Cpu {
            return Err(ConfigError::AutocastRequiresAccelerator);
        }
        if self.policy_layer_sizes.iter().any(|&s| s == 0)
            || self.critic_layer_sizes.iter().any(|&s| s == 0)
        {
            return Err(ConfigError::ZeroLayerWidth);
        }
        Ok(())
    }
}

/// Fatal configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `batch_size` is zero.
    ZeroBatchSize,
    /// `batch_size` is not a multiple of `mini_batch_size`.
    MiniBatchMustDivide {
        batch_size: usize,
        mini_batch_size: usize,
    },
    /// Autocast requested on a CPU device.
    AutocastRequiresAccelerator,
    /// A hidden layer has zero width.
    ZeroLayerWidth,
    /// An option referenced in configuration is not supported yet.
    Unsupported(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroBatchSize => {
                write!(f, "PPOLearner: batch_size must be non-zero")
            }
            ConfigError::MiniBatchMustDivide {
                batch_size,
                mini_batch_size,
            } => write!(
                f,
                "PPOLearner: batch_size ({}) must be a multiple of mini_batch_size ({})",
                batch_size, mini_batch_size
            ),
            ConfigError::AutocastRequiresAccelerator => {
                write!(f, "PPOLearner: autocast_learn requires an accelerator device")
            }
            ConfigError::ZeroLayerWidth => {
                write!(f, "PPOLearner: hidden layer widths must be non-zero")
            }
            ConfigError::Unsupported(option) => {
                write!(f, "PPOLearner: option not supported: {}", option)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
