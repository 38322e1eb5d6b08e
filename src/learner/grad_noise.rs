//! Gradient noise scale tracking.
//!
//! Estimates the critical batch size signal from McCandlish et al.,
//! "An Empirical Model of Large-Batch Training" (2018): compare the
//! gradient norm of the full accumulation batch against the norms of its
//! mini-batch pieces, form unbiased estimates of the true gradient square
//! `|G|²` and the per-sample noise `S`, smooth both with EMAs, and report
//! their ratio.

/// Tracks the gradient noise scale across optimizer steps.
#[derive(Debug)]
pub struct GradNoiseTracker {
    big_batch_size: usize,
    update_interval: usize,
    decay: f64,
    steps: usize,
    ema_g2: Option<f64>,
    ema_s: Option<f64>,
    last_noise_scale: f64,
}

impl GradNoiseTracker {
    /// Create a tracker for accumulation batches of `big_batch_size`
    /// samples, refreshing every `update_interval` steps.
    pub fn new(big_batch_size: usize, update_interval: usize, decay: f64) -> Self {
        Self {
            big_batch_size,
            update_interval: update_interval.max(1),
            decay,
            steps: 0,
            ema_g2: None,
            ema_s: None,
            last_noise_scale: 0.0,
        }
    }

    /// Feed one optimizer step's gradient norms.
    ///
    /// * `small_norms` - per-mini-batch gradient L2 norms
    /// * `small_batch_size` - samples per mini-batch
    /// * `big_norm` - gradient L2 norm of the full accumulated batch
    pub fn update(&mut self, small_norms: &[f32], small_batch_size: usize, big_norm: f32) {
        self.steps += 1;
        if self.steps % self.update_interval != 0 {
            return;
        }
        if small_norms.is_empty() || small_batch_size == 0 {
            return;
        }
        if small_batch_size >= self.big_batch_size {
            // No scale separation to estimate from.
            return;
        }

        let g_small_sq = small_norms
            .iter()
            .map(|&n| (n as f64) * (n as f64))
            .sum::<f64>()
            / small_norms.len() as f64;
        let g_big_sq = (big_norm as f64) * (big_norm as f64);

        let b_small = small_batch_size as f64;
        let b_big = self.big_batch_size as f64;

        let g2_est = (b_big * g_big_sq - b_small * g_small_sq) / (b_big - b_small);
        let s_est = (g_small_sq - g_big_sq) / (1.0 / b_small - 1.0 / b_big);

        self.ema_g2 = Some(match self.ema_g2 {
            Some(prev) => prev * self.decay + g2_est * (1.0 - self.decay),
            None => g2_est,
        });
        self.ema_s = Some(match self.ema_s {
            Some(prev) => prev * self.decay + s_est * (1.0 - self.decay),
            None => s_est,
        });

        if let (Some(g2), Some(s)) = (self.ema_g2, self.ema_s) {
            if g2.abs() > f64::EPSILON {
                let scale = s / g2;
                if scale.is_finite() {
                    self.last_noise_scale = scale;
                }
            }
        }
    }

    /// Most recent noise-scale estimate; 0 until the first refresh.
    pub fn noise_scale(&self) -> f64 {
        self.last_noise_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_estimate_before_interval() {
        let mut tracker = GradNoiseTracker::new(64, 4, 0.9);
        tracker.update(&[1.0, 1.0], 16, 0.5);
        tracker.update(&[1.0, 1.0], 16, 0.5);
        tracker.update(&[1.0, 1.0], 16, 0.5);
        assert_eq!(tracker.noise_scale(), 0.0);

        tracker.update(&[1.0, 1.0], 16, 0.5);
        assert!(tracker.noise_scale() != 0.0);
    }

    #[test]
    fn test_noisy_gradients_give_positive_scale() {
        // Small-batch norms much larger than the big-batch norm means the
        // per-sample noise dominates the true gradient.
        let mut tracker = GradNoiseTracker::new(64, 1, 0.0);
        tracker.update(&[4.0, 4.0, 4.0, 4.0], 16, 1.0);

        assert!(tracker.noise_scale() > 0.0);
        assert!(tracker.noise_scale().is_finite());
    }

    #[test]
    fn test_ema_smooths_refreshes() {
        let mut fast = GradNoiseTracker::new(64, 1, 0.0);
        let mut slow = GradNoiseTracker::new(64, 1, 0.99);

        for _ in 0..3 {
            fast.update(&[4.0; 4], 16, 1.0);
            slow.update(&[4.0; 4], 16, 1.0);
        }
        // First refresh seeds both; a large one-off spike moves the
        // undamped tracker further.
        fast.update(&[40.0; 4], 16, 1.0);
        slow.update(&[40.0; 4], 16, 1.0);

        assert!((fast.noise_scale() - slow.noise_scale()).abs() > 1e-6);
    }

    #[test]
    fn test_degenerate_inputs_ignored() {
        let mut tracker = GradNoiseTracker::new(16, 1, 0.9);
        tracker.update(&[], 8, 1.0);
        tracker.update(&[1.0], 16, 1.0); // no scale separation
        assert_eq!(tracker.noise_scale(), 0.0);
    }
}
