//! PPO loss functions and surrogate diagnostics.
//!
//! Tensor-valued losses participate in the autodiff graph; the diagnostic
//! helpers (KL estimate, clip fraction) work on detached host values since
//! they are reporting-only.
//!
//! # Numerical Stability
//!
//! Probability ratios go through exp(log_ratio) with the log ratio clamped
//! to [-20, 20], bounding ratios to roughly [2e-9, 5e8].

use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;

/// Maximum log ratio before exponentiation.
const MAX_LOG_RATIO: f32 = 20.0;

/// PPO clipped surrogate loss.
///
/// L^CLIP = −E[min(r_t · A_t, clip(r_t, 1−ε, 1+ε) · A_t)]
/// with r_t = exp(log π_new − log π_old).
///
/// Returns the negated objective as a single-element tensor, ready for
/// minimization.
pub fn ppo_clip_loss<B: AutodiffBackend>(
    log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_range: f32,
) -> Tensor<B, 1> {
    let log_ratio = (log_probs - old_log_probs).clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO);
    let ratio = log_ratio.exp();

    let clipped = ratio.clone().clamp(1.0 - clip_range, 1.0 + clip_range);

    let surr1 = ratio * advantages.clone();
    let surr2 = clipped * advantages;

    -surr1.min_pair(surr2).mean()
}

/// Value-function regression loss: mean squared error against the GAE
/// value targets.
pub fn value_mse<B: AutodiffBackend>(
    values: Tensor<B, 1>,
    targets: Tensor<B, 1>,
) -> Tensor<B, 1> {
    MseLoss::new().forward(values, targets, Reduction::Mean)
}

/// Low-variance KL estimator over detached log ratios:
/// mean((exp(lr) − 1) − lr).
pub fn sb3_kl_divergence(log_ratios: &[f32]) -> f32 {
    if log_ratios.is_empty() {
        return 0.0;
    }
    let sum: f32 = log_ratios
        .iter()
        .map(|&lr| {
            let lr = lr.clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO);
            (lr.exp() - 1.0) - lr
        })
        .sum();
    sum / log_ratios.len() as f32
}

/// Fraction of samples whose probability ratio left [1−ε, 1+ε].
pub fn clip_fraction(ratios: &[f32], clip_range: f32) -> f32 {
    if ratios.is_empty() {
        return 0.0;
    }
    let clipped = ratios
        .iter()
        .filter(|&&r| (r - 1.0).abs() > clip_range)
        .count();
    clipped as f32 / ratios.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray<f32>>;

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_data().as_slice::<f32>().unwrap()[0]
    }

    #[test]
    fn test_clip_loss_unit_ratio() {
        let device = Default::default();
        // Identical log probs give ratio 1; loss is −mean(A).
        let log_probs = Tensor::<B, 1>::from_floats([-1.0, -1.0], &device);
        let old = Tensor::<B, 1>::from_floats([-1.0, -1.0], &device);
        let adv = Tensor::<B, 1>::from_floats([1.0, 3.0], &device);

        let loss = scalar(ppo_clip_loss(log_probs, old, adv, 0.2));
        assert!((loss - (-2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_clip_loss_clamps_large_ratio() {
        let device = Default::default();
        // ratio = 2.0 everywhere with positive advantages and ε = 0.2:
        // the clipped branch wins and the loss is −1.2 · mean(A).
        let log_probs = Tensor::<B, 1>::from_floats([0.0, 0.0], &device);
        let old = Tensor::<B, 1>::from_floats([-(2.0f32.ln()), -(2.0f32.ln())], &device);
        let adv = Tensor::<B, 1>::from_floats([1.0, 2.0], &device);

        let loss = scalar(ppo_clip_loss(log_probs, old, adv, 0.2));
        assert!((loss - (-1.2 * 1.5)).abs() < 1e-5);
    }

    #[test]
    fn test_value_mse() {
        let device = Default::default();
        let values = Tensor::<B, 1>::from_floats([1.0, 2.0], &device);
        let targets = Tensor::<B, 1>::from_floats([2.0, 4.0], &device);

        let loss = scalar(value_mse(values, targets));
        assert!((loss - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_sb3_kl_zero_for_identical_policies() {
        assert!(sb3_kl_divergence(&[0.0, 0.0, 0.0]).abs() < 1e-9);
    }

    #[test]
    fn test_sb3_kl_positive() {
        // (exp(x) − 1) − x > 0 for any x != 0.
        assert!(sb3_kl_divergence(&[0.5]) > 0.0);
        assert!(sb3_kl_divergence(&[-0.5]) > 0.0);
    }

    #[test]
    fn test_clip_fraction() {
        assert_eq!(clip_fraction(&[1.0, 1.1, 1.5, 0.5], 0.2), 0.5);
        assert_eq!(clip_fraction(&[2.0, 2.0], 0.2), 1.0);
        assert_eq!(clip_fraction(&[], 0.2), 0.0);
    }
}
