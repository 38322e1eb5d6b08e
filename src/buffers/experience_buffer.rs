//! Fixed-capacity sliding tensor store for PPO experience.
//!
//! The buffer keeps the newest `max_size` timesteps across all historical
//! submissions, per field, in arrival order (oldest at row 0). Submitting
//! past capacity evicts the oldest retained rows; a single oversized batch
//! keeps only its newest `max_size` rows.
//!
//! Mini-batches are drawn through a permutation from the buffer's own
//! seeded RNG, so a given seed and submission history replays
//! bit-identically. [`ExperienceBuffer::clear`] reseeds with the original
//! seed for deterministic restarts.

use burn::tensor::backend::Backend;
use burn::tensor::{BasicOps, Int, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;

use crate::core::GameTrajectory;

/// Batched experience fields sharing one leading dimension.
#[derive(Debug, Clone)]
pub struct ExperienceTensors<B: Backend> {
    /// Observations `[n, obs_size]`.
    pub states: Tensor<B, 2>,
    /// Action indices `[n]`.
    pub actions: Tensor<B, 1, Int>,
    /// Behavior-policy log probabilities `[n]`.
    pub log_probs: Tensor<B, 1>,
    /// Step rewards `[n]`.
    pub rewards: Tensor<B, 1>,
    /// Next observations `[n, obs_size]`.
    pub next_states: Tensor<B, 2>,
    /// Terminal flags as 0/1 floats `[n]`.
    pub dones: Tensor<B, 1>,
    /// Truncation flags as 0/1 floats `[n]`.
    pub truncateds: Tensor<B, 1>,
    /// GAE value targets `[n]`.
    pub values: Tensor<B, 1>,
    /// GAE advantages `[n]`.
    pub advantages: Tensor<B, 1>,
}

impl<B: Backend> ExperienceTensors<B> {
    /// Build experience tensors from a harvested trajectory plus the GAE
    /// outputs computed for it.
    pub fn from_trajectory(
        traj: &GameTrajectory,
        value_targets: &[f32],
        advantages: &[f32],
        device: &B::Device,
    ) -> Self {
        let n = traj.len;
        let actions: Vec<i32> = traj.actions.iter().map(|&a| a as i32).collect();
        let dones: Vec<f32> = traj.dones.iter().map(|&d| d as u8 as f32).collect();
        let truncateds: Vec<f32> = traj.truncateds.iter().map(|&t| t as u8 as f32).collect();

        Self {
            states: Tensor::<B, 1>::from_floats(traj.states.as_slice(), device)
                .reshape([n, traj.obs_size]),
            actions: Tensor::from_ints(actions.as_slice(), device),
            log_probs: Tensor::from_floats(traj.log_probs.as_slice(), device),
            rewards: Tensor::from_floats(traj.rewards.as_slice(), device),
            next_states: Tensor::<B, 1>::from_floats(traj.next_states.as_slice(), device)
                .reshape([n, traj.obs_size]),
            dones: Tensor::from_floats(dones.as_slice(), device),
            truncateds: Tensor::from_floats(truncateds.as_slice(), device),
            values: Tensor::from_floats(value_targets, device),
            advantages: Tensor::from_floats(advantages, device),
        }
    }

    /// Leading dimension shared by all fields.
    pub fn len(&self) -> usize {
        self.states.dims()[0]
    }

    /// Whether the batch holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(&self) -> Result<(), BufferError> {
        let n = self.len();
        let lens = [
            self.actions.dims()[0],
            self.log_probs.dims()[0],
            self.rewards.dims()[0],
            self.next_states.dims()[0],
            self.dones.dims()[0],
            self.truncateds.dims()[0],
            self.values.dims()[0],
            self.advantages.dims()[0],
        ];
        for &len in &lens {
            if len != n {
                return Err(BufferError::FieldSizeMismatch {
                    expected: n,
                    found: len,
                });
            }
        }
        Ok(())
    }

    /// Keep only the newest `size` rows of every field.
    fn tail(self, size: usize) -> Self {
        let n = self.len();
        if n <= size {
            return self;
        }
        let range = n - size..n;
        Self {
            states: self.states.slice([range.clone()]),
            actions: self.actions.slice([range.clone()]),
            log_probs: self.log_probs.slice([range.clone()]),
            rewards: self.rewards.slice([range.clone()]),
            next_states: self.next_states.slice([range.clone()]),
            dones: self.dones.slice([range.clone()]),
            truncateds: self.truncateds.slice([range.clone()]),
            values: self.values.slice([range.clone()]),
            advantages: self.advantages.slice([range]),
        }
    }

    /// Append `newer` after `self`, dropping oldest rows past `size`.
    fn concat_tail(self, newer: Self, size: usize) -> Self {
        Self {
            states: concat_tail(self.states, newer.states, size),
            actions: concat_tail(self.actions, newer.actions, size),
            log_probs: concat_tail(self.log_probs, newer.log_probs, size),
            rewards: concat_tail(self.rewards, newer.rewards, size),
            next_states: concat_tail(self.next_states, newer.next_states, size),
            dones: concat_tail(self.dones, newer.dones, size),
            truncateds: concat_tail(self.truncateds, newer.truncateds, size),
            values: concat_tail(self.values, newer.values, size),
            advantages: concat_tail(self.advantages, newer.advantages, size),
        }
    }

    fn select_rows(&self, indices: &Tensor<B, 1, Int>) -> SampleSet<B> {
        SampleSet {
            actions: self.actions.clone().select(0, indices.clone()),
            log_probs: self.log_probs.clone().select(0, indices.clone()),
            states: self.states.clone().select(0, indices.clone()),
            values: self.values.clone().select(0, indices.clone()),
            advantages: self.advantages.clone().select(0, indices.clone()),
        }
    }
}

/// Combine two tensors along dim 0, keeping only the newest `size` rows.
fn concat_tail<B: Backend, const D: usize, K>(
    older: Tensor<B, D, K>,
    newer: Tensor<B, D, K>,
    size: usize,
) -> Tensor<B, D, K>
where
    K: BasicOps<B>,
{
    let len1 = older.dims()[0];
    let len2 = newer.dims()[0];

    if len2 >= size {
        newer.slice([len2 - size..len2])
    } else if len1 + len2 > size {
        let kept = older.slice([len1 + len2 - size..len1]);
        Tensor::cat(vec![kept, newer], 0)
    } else {
        Tensor::cat(vec![older, newer], 0)
    }
}

/// One shuffled mini-batch: exactly the fields the learner consumes.
#[derive(Debug, Clone)]
pub struct SampleSet<B: Backend> {
    /// Action indices `[batch]`.
    pub actions: Tensor<B, 1, Int>,
    /// Behavior-policy log probabilities `[batch]`.
    pub log_probs: Tensor<B, 1>,
    /// Observations `[batch, obs_size]`.
    pub states: Tensor<B, 2>,
    /// Value targets `[batch]`.
    pub values: Tensor<B, 1>,
    /// Advantages `[batch]`.
    pub advantages: Tensor<B, 1>,
}

/// Error raised on malformed submissions.
#[derive(Debug)]
pub enum BufferError {
    /// A field's leading dimension disagrees with the batch.
    FieldSizeMismatch { expected: usize, found: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::FieldSizeMismatch { expected, found } => write!(
                f,
                "ExperienceBuffer: field leading dimension mismatch (expected {}, found {})",
                expected, found
            ),
        }
    }
}

impl std::error::Error for BufferError {}

/// Fixed-capacity sliding experience store with deterministic shuffling.
pub struct ExperienceBuffer<B: Backend> {
    device: B::Device,
    seed: u64,
    rng: StdRng,
    data: Option<ExperienceTensors<B>>,
    cur_size: usize,
    max_size: usize,
}

impl<B: Backend> ExperienceBuffer<B> {
    /// Create a buffer holding at most `max_size` timesteps.
    pub fn new(max_size: usize, seed: u64, device: B::Device) -> Self {
        Self {
            device,
            seed,
            rng: StdRng::seed_from_u64(seed),
            data: None,
            cur_size: 0,
            max_size,
        }
    }

    /// Number of valid timesteps currently stored.
    pub fn len(&self) -> usize {
        self.cur_size
    }

    /// Whether the buffer holds no timesteps.
    pub fn is_empty(&self) -> bool {
        self.cur_size == 0
    }

    /// Capacity in timesteps.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Device the stored tensors live on.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Append a batch, evicting the oldest rows past capacity.
    ///
    /// After return, rows `[0, len)` equal the newest `len` rows of the
    /// naive concatenation of every submission so far.
    pub fn submit(&mut self, batch: ExperienceTensors<B>) -> Result<(), BufferError> {
        batch.validate()?;

        if batch.is_empty() {
            return Ok(());
        }

        let batch = batch.tail(self.max_size);
        let added = batch.len();

        self.data = Some(match self.data.take() {
            None => batch,
            Some(existing) => existing.concat_tail(batch, self.max_size),
        });
        self.cur_size = (self.cur_size + added).min(self.max_size);

        Ok(())
    }

    /// Draw disjoint shuffled mini-batches of exactly `batch_size` rows.
    ///
    /// The trailing `len % batch_size` rows of the permutation are
    /// dropped. Deterministic for a given seed and submission history.
    pub fn shuffled_batches(&mut self, batch_size: usize) -> Vec<SampleSet<B>> {
        let data = match &self.data {
            Some(data) if self.cur_size > 0 && batch_size > 0 => data,
            _ => return Vec::new(),
        };

        let mut indices: Vec<i32> = (0..self.cur_size as i32).collect();
        indices.shuffle(&mut self.rng);

        indices
            .chunks_exact(batch_size)
            .map(|chunk| {
                let index_tensor: Tensor<B, 1, Int> = Tensor::from_ints(chunk, &self.device);
                data.select_rows(&index_tensor)
            })
            .collect()
    }

    /// Drop all stored data and reseed the RNG with the original seed.
    pub fn clear(&mut self) {
        self.data = None;
        self.cur_size = 0;
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}
