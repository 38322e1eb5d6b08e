//! Generalized Advantage Estimation over harvested trajectories.
//!
//! ## Formula
//!
//! A_t = Σ_{l≥0} (γλ)^l δ_{t+l}  with  δ_t = r_t/σ + γ V(s_{t+1}) − V(s_t)
//!
//! where σ is the running return standard deviation (1 disables
//! standardization). Episode boundaries cut the accumulation:
//!
//! - terminal (`done`): the next-state value contributes nothing and the
//!   accumulator restarts at the boundary;
//! - truncation (`truncated`): the next-state value still bootstraps, but
//!   the accumulator restarts because the cut carries no information.
//!
//! Segments harvested from different games are safe to concatenate: every
//! segment ends in a closed boundary, so the backward scan never leaks
//! advantage mass across segments.
//!
//! ## References
//!
//! - Schulman et al., "High-Dimensional Continuous Control Using
//!   Generalized Advantage Estimation" (2016)

/// Advantages and value targets for one harvested batch.
#[derive(Debug, Clone)]
pub struct GaeOutput {
    /// GAE advantages `[n]`.
    pub advantages: Vec<f32>,
    /// Critic regression targets `A_t + V(s_t)` `[n]`.
    pub value_targets: Vec<f32>,
    /// Unstandardized returns `(A_t + V(s_t)) * σ` `[n]`, fed back into
    /// the running return statistics.
    pub returns: Vec<f32>,
}

/// Compute advantages, value targets, and returns for a batch.
///
/// # Arguments
///
/// * `rewards` - step rewards `[n]`
/// * `dones` - terminal flags `[n]`
/// * `truncateds` - truncation flags `[n]`
/// * `value_preds` - value predictions `[n + 1]`, one per state plus one
///   for the final next-state
/// * `gamma` - discount factor
/// * `lambda` - GAE smoothing parameter
/// * `ret_std` - running return standard deviation (1 disables
///   standardization)
/// * `reward_clip` - optional symmetric clip applied to rewards before
///   standardization
///
/// # Panics
///
/// Panics if `value_preds` is not exactly one longer than the other
/// inputs, or the inputs disagree in length.
pub fn compute_gae(
    rewards: &[f32],
    dones: &[bool],
    truncateds: &[bool],
    value_preds: &[f32],
    gamma: f32,
    lambda: f32,
    ret_std: f32,
    reward_clip: Option<f32>,
) -> GaeOutput {
    let n = rewards.len();
    assert_eq!(dones.len(), n);
    assert_eq!(truncateds.len(), n);
    assert_eq!(value_preds.len(), n + 1);

    let mut advantages = vec![0.0f32; n];
    let mut value_targets = vec![0.0f32; n];
    let mut returns = vec![0.0f32; n];

    let mut last_gae = 0.0f32;

    for t in (0..n).rev() {
        let mut reward = rewards[t];
        if let Some(clip) = reward_clip {
            reward = reward.clamp(-clip, clip);
        }
        let norm_reward = reward / ret_std;

        let (next_value, carry) = if dones[t] {
            (0.0, 0.0)
        } else if truncateds[t] {
            (value_preds[t + 1], 0.0)
        } else {
            (value_preds[t + 1], last_gae)
        };

        let delta = norm_reward + gamma * next_value - value_preds[t];
        last_gae = delta + gamma * lambda * carry;

        advantages[t] = last_gae;
        value_targets[t] = last_gae + value_preds[t];
        returns[t] = last_gae * ret_std + value_preds[t] * ret_std;
    }

    GaeOutput {
        advantages,
        value_targets,
        returns,
    }
}
