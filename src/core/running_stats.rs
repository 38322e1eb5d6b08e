//! Welford running statistics for return standardization.
//!
//! Tracks per-dimension running mean and variance over a stream of samples
//! using Welford's online algorithm, which stays numerically stable for
//! very large sample counts. The trainer feeds it unstandardized returns
//! each iteration and divides rewards by the resulting standard deviation
//! inside the advantage computation.
//!
//! The struct serializes directly into the checkpoint stats JSON under
//! `reward_running_stats` with fields `mean`, `var`, `shape`, `count`.

use serde::{Deserialize, Serialize};

/// Per-dimension running mean/variance (Welford's online algorithm).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelfordRunningStat {
    /// Running mean per dimension.
    #[serde(rename = "mean")]
    running_mean: Vec<f64>,
    /// Running sum of squared deviations per dimension.
    ///
    /// Variance on read is `var_sum / count`.
    #[serde(rename = "var")]
    running_variance: Vec<f64>,
    /// Dimensionality of each sample.
    shape: Vec<usize>,
    /// Number of samples folded in.
    count: u64,
}

/// Floor applied to standard deviations to keep divisions finite.
const STD_EPSILON: f64 = 1e-8;

impl WelfordRunningStat {
    /// Create statistics for `dim`-dimensional samples.
    pub fn new(dim: usize) -> Self {
        Self {
            running_mean: vec![0.0; dim],
            running_variance: vec![0.0; dim],
            shape: vec![dim],
            count: 0,
        }
    }

    /// Fold in a single sample.
    ///
    /// # Panics
    ///
    /// Panics if the sample dimensionality does not match.
    pub fn update(&mut self, sample: &[f32]) {
        assert_eq!(
            sample.len(),
            self.running_mean.len(),
            "sample dimension mismatch"
        );

        self.count += 1;
        for (i, &x) in sample.iter().enumerate() {
            let x = x as f64;
            let delta = x - self.running_mean[i];
            self.running_mean[i] += delta / self.count as f64;
            let delta2 = x - self.running_mean[i];
            self.running_variance[i] += delta * delta2;
        }
    }

    /// Fold in at most `cap` scalar samples from `values`.
    ///
    /// Used by the trainer, which bounds the number of returns folded in
    /// per iteration.
    pub fn increment(&mut self, values: &[f32], cap: usize) {
        for &v in values.iter().take(cap) {
            self.update(&[v]);
        }
    }

    /// Standard deviation per dimension, floored to stay usable as a
    /// divisor. Reports unit deviation until two samples have been seen.
    pub fn std(&self) -> Vec<f64> {
        if self.count < 2 {
            return vec![1.0; self.running_mean.len()];
        }
        self.running_variance
            .iter()
            .map(|&v| (v / self.count as f64).sqrt().max(STD_EPSILON))
            .collect()
    }

    /// Population variance per dimension.
    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2 {
            return vec![1.0; self.running_mean.len()];
        }
        self.running_variance
            .iter()
            .map(|&v| v / self.count as f64)
            .collect()
    }

    /// Running mean per dimension.
    pub fn mean(&self) -> &[f64] {
        &self.running_mean
    }

    /// Number of samples seen.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Dimensionality of each sample.
    pub fn dim(&self) -> usize {
        self.running_mean.len()
    }

    /// Reset to the empty state.
    pub fn reset(&mut self) {
        self.running_mean.fill(0.0);
        self.running_variance.fill(0.0);
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        let mut stats = WelfordRunningStat::new(2);
        stats.update(&[1.0, 2.0]);
        stats.update(&[3.0, 4.0]);
        stats.update(&[5.0, 6.0]);

        assert!((stats.mean()[0] - 3.0).abs() < 1e-10);
        assert!((stats.mean()[1] - 4.0).abs() < 1e-10);
        assert_eq!(stats.count(), 3);
    }

    #[test]
    fn test_variance() {
        let mut stats = WelfordRunningStat::new(1);
        // Mean 5, population variance 4.
        for &x in &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.update(&[x]);
        }

        assert!((stats.variance()[0] - 4.0).abs() < 1e-10);
        assert!((stats.std()[0] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_incremental_matches_single_pass() {
        // Folding in several chunks must match one batch computation.
        let data: Vec<f32> = (0..100).map(|i| (i as f32) * 0.37 - 18.0).collect();

        let mut chunked = WelfordRunningStat::new(1);
        chunked.increment(&data[..13], usize::MAX);
        chunked.increment(&data[13..57], usize::MAX);
        chunked.increment(&data[57..], usize::MAX);

        let n = data.len() as f64;
        let mean: f64 = data.iter().map(|&x| x as f64).sum::<f64>() / n;
        let var: f64 = data
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        assert!((chunked.mean()[0] - mean).abs() < 1e-9);
        assert!((chunked.variance()[0] - var).abs() < 1e-9);
    }

    #[test]
    fn test_increment_cap() {
        let mut stats = WelfordRunningStat::new(1);
        stats.increment(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(stats.count(), 2);
        assert!((stats.mean()[0] - 1.5).abs() < 1e-10);
    }

    #[test]
    fn test_std_before_two_samples() {
        let mut stats = WelfordRunningStat::new(1);
        assert_eq!(stats.std()[0], 1.0);
        stats.update(&[7.0]);
        assert_eq!(stats.std()[0], 1.0);
    }

    #[test]
    fn test_json_round_trip() {
        let mut stats = WelfordRunningStat::new(1);
        stats.increment(&[0.5, -1.5, 2.25], usize::MAX);

        let text = serde_json::to_string(&stats).unwrap();
        let restored: WelfordRunningStat = serde_json::from_str(&text).unwrap();

        assert_eq!(stats.count(), restored.count());
        assert_eq!(stats.mean(), restored.mean());
        assert_eq!(stats.variance(), restored.variance());
    }
}
