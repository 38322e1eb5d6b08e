//! Discrete action policy.
//!
//! A feed-forward MLP mapping observations to categorical logits over the
//! action space. Logits are divided by a fixed temperature before softmax:
//! temperatures above 1 flatten the distribution, below 1 sharpen it.
//!
//! Collection-side sampling detaches from the autodiff graph and draws
//! from the caller's RNG; the training-side [`DiscretePolicy::get_backprop_data`]
//! keeps gradients flowing for the surrogate loss.

use burn::module::{Ignored, Module};
use burn::nn::Linear;
use burn::tensor::activation::{log_softmax, relu, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use rand::Rng;

use super::{build_mlp, to_f32_vec};

/// Actions chosen for one batched observation.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// One action index per row.
    pub actions: Vec<u32>,
    /// Log probability of each chosen action.
    pub log_probs: Vec<f32>,
}

/// Training-side policy output with gradient flow.
#[derive(Debug)]
pub struct BackpropData<B: Backend> {
    /// Log probability of each given action: `[batch]`.
    pub action_log_probs: Tensor<B, 1>,
    /// Mean Shannon entropy of the batch distribution (single element).
    pub entropy: Tensor<B, 1>,
}

/// MLP policy over a discrete action space.
#[derive(Module, Debug)]
pub struct DiscretePolicy<B: Backend> {
    layers: Vec<Linear<B>>,
    temperature: Ignored<f32>,
    action_count: Ignored<usize>,
}

impl<B: Backend> DiscretePolicy<B> {
    /// Create a policy for `obs_size` inputs and `action_count` discrete
    /// actions, with the given hidden layer widths.
    pub fn new(
        obs_size: usize,
        action_count: usize,
        layer_sizes: &[usize],
        temperature: f32,
        device: &B::Device,
    ) -> Self {
        let mut sizes = vec![obs_size];
        sizes.extend_from_slice(layer_sizes);
        sizes.push(action_count);

        Self {
            layers: build_mlp(&sizes, device),
            temperature: Ignored(temperature),
            action_count: Ignored(action_count),
        }
    }

    /// Size of the action space.
    pub fn action_count(&self) -> usize {
        self.action_count.0
    }

    /// Temperature-scaled logits: `[batch, action_count]`.
    pub fn forward_logits(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = obs;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i != last {
                x = relu(x);
            }
        }
        x.div_scalar(self.temperature.0)
    }

    /// Softmaxed action probabilities: `[batch, action_count]`.
    pub fn get_action_probs(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        softmax(self.forward_logits(obs), 1)
    }

    /// Choose one action per row.
    ///
    /// Deterministic mode takes the argmax and is a pure function of the
    /// logits; otherwise actions are drawn categorically from `rng`.
    pub fn get_action(
        &self,
        obs: Tensor<B, 2>,
        deterministic: bool,
        rng: &mut impl Rng,
    ) -> ActionResult {
        let probs = self.get_action_probs(obs);
        let [batch, n_actions] = probs.dims();
        let probs_host = to_f32_vec(probs);

        let mut actions = Vec::with_capacity(batch);
        let mut log_probs = Vec::with_capacity(batch);

        for row in probs_host.chunks_exact(n_actions) {
            let selected = if deterministic {
                row.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            } else {
                // Cumulative-sum sampling; the final index absorbs any
                // floating-point shortfall below 1.0.
                let draw: f32 = rng.gen();
                let mut cumsum = 0.0f32;
                let mut selected = n_actions - 1;
                for (i, &p) in row.iter().enumerate() {
                    cumsum += p;
                    if draw < cumsum {
                        selected = i;
                        break;
                    }
                }
                selected
            };

            actions.push(selected as u32);
            log_probs.push((row[selected] + 1e-8).ln());
        }

        ActionResult { actions, log_probs }
    }

    /// Log probabilities and mean entropy for given observation/action
    /// pairs, with gradient flow for the surrogate loss.
    pub fn get_backprop_data(&self, obs: Tensor<B, 2>, actions: &[u32]) -> BackpropData<B> {
        let batch = actions.len();
        let logits = self.forward_logits(obs);
        let log_probs = log_softmax(logits.clone(), 1);
        let probs = softmax(logits, 1);

        let indices: Vec<i32> = actions.iter().map(|&a| a as i32).collect();
        let index_tensor: Tensor<B, 1, Int> = Tensor::from_ints(indices.as_slice(), &probs.device());
        let index_2d: Tensor<B, 2, Int> = index_tensor.reshape([batch, 1]);

        let selected: Tensor<B, 1> = log_probs.clone().gather(1, index_2d).flatten(0, 1);

        let neg_entropy: Tensor<B, 2> = (probs * log_probs).sum_dim(1);
        let entropy: Tensor<B, 1> = -neg_entropy.flatten::<1>(0, 1).mean();

        BackpropData {
            action_log_probs: selected,
            entropy,
        }
    }

    /// Device the parameters live on.
    pub fn device(&self) -> B::Device {
        self.layers[0].weight.val().device()
    }

    /// All parameters flattened to host values, in layer order.
    pub fn flat_params(&self) -> Vec<f32> {
        super::layers_flat_params(&self.layers)
    }

    /// Element count per parameter tensor, in layer order.
    pub fn param_sizes(&self) -> Vec<usize> {
        super::layers_param_sizes(&self.layers)
    }

    /// Round-trip all parameters through f16 for a half-precision
    /// inference snapshot.
    pub fn half_precision(mut self) -> Self {
        self.layers = super::layers_half_round_trip(self.layers);
        self
    }

    pub(crate) fn layers(&self) -> &[Linear<B>] {
        &self.layers
    }
}
