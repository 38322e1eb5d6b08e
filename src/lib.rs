//! # soccar-ppo: Multi-Threaded PPO Training for Car Soccer
//!
//! Training engine that runs many simulated car-soccer games in parallel,
//! harvests trajectories with the current policy, and updates a discrete
//! policy and a value estimator with clipped-surrogate PPO.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Thread 1          Thread 2          Thread N                     │
//! │  ┌──────────┐      ┌──────────┐      ┌──────────┐                 │
//! │  │Collector0│      │Collector1│      │CollectorN│                 │
//! │  │ games    │      │ games    │      │ games    │                 │
//! │  │ infer    │      │ infer    │      │ infer    │                 │
//! │  └────┬─────┘      └────┬─────┘      └────┬─────┘                 │
//! │       │   trajectory segments   │         │                       │
//! │       └────────────────┬────────┴─────────┘                       │
//! │                        ▼                                          │
//! │               ┌─────────────────┐     ┌────────────────┐          │
//! │               │ CollectorPool   │     │ PolicyPublisher│          │
//! │               │ (harvest + GAE) │     │ (snapshot swap)│          │
//! │               └────────┬────────┘     └───────▲────────┘          │
//! │                        ▼                      │                   │
//! │               ┌─────────────────┐    ┌────────┴───────┐           │
//! │               │ ExperienceBuffer│───►│  PPOLearner    │           │
//! │               │ (sliding FIFO)  │    │ (epochs, Adam) │           │
//! │               └─────────────────┘    └────────────────┘           │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`runners::Trainer`] owns the loop: collect at least
//! `timesteps_per_iteration` steps from the pool, predict values and run
//! GAE, submit to the buffer, learn for `epochs` passes of shuffled
//! mini-batches, then handle metrics and periodic checkpoints. Collector
//! workers read the policy through published snapshots, so the learner
//! never blocks on them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use soccar_ppo::{Trainer, TrainerConfig};
//! use burn::backend::{Autodiff, NdArray};
//!
//! let config = TrainerConfig::default();
//! let mut trainer: Trainer<Autodiff<NdArray<f32>>> =
//!     Trainer::new(env_create_fn, config, Default::default(), None, None)?;
//! trainer.learn()?;
//! ```

pub mod algorithms;
pub mod buffers;
pub mod checkpoint;
pub mod collectors;
pub mod core;
pub mod environment;
pub mod learner;
pub mod metrics;
pub mod nn;
pub mod runners;

pub use crate::core::running_stats::WelfordRunningStat;
pub use crate::core::transition::{GameTrajectory, TrajectoryError, TrajectorySegment, Transition};
pub use crate::core::policy_slot::{PolicyPublisher, PolicySlot, SharedPolicySlot};

pub use algorithms::gae::{compute_gae, GaeOutput};

pub use buffers::{BufferError, ExperienceBuffer, ExperienceTensors, SampleSet};

pub use nn::{ActionResult, DiscretePolicy, ValueEstimator};

pub use learner::{ConfigError, DeviceKind, LearnError, PPOLearner, PPOLearnerConfig};

pub use collectors::{CollectorPool, CollectorPoolConfig, CollectorWorker, WorkerContext};

pub use environment::{
    probe_env, EnvCreateFn, EnvProbe, Gym, RenderFrame, RenderSink, StepResult,
};

pub use metrics::{display_report, MetricsSink, Report};

pub use checkpoint::{CheckpointError, Checkpointer, TrainingStats};

pub use runners::{Trainer, TrainerConfig, TrainerError};
