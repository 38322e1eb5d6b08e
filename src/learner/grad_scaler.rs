//! Loss scaling for mixed-precision learning.
//!
//! Reduced-precision backward passes can underflow small gradients to
//! zero. The scaler multiplies losses before backward, the learner
//! unscales the accumulated gradients before stepping, and non-finite
//! gradients skip the step and shrink the scale. A long run of clean
//! steps grows the scale back.

/// Dynamic loss scale with grow/backoff control.
#[derive(Debug)]
pub struct GradScaler {
    scale: f32,
    growth_factor: f32,
    backoff_factor: f32,
    growth_interval: usize,
    good_steps: usize,
}

impl GradScaler {
    /// Create a scaler with the conventional starting scale of 2^16.
    pub fn new() -> Self {
        Self {
            scale: 65536.0,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
            good_steps: 0,
        }
    }

    /// Current loss multiplier.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Factor that undoes the loss multiplier on gradients.
    pub fn unscale_factor(&self) -> f32 {
        1.0 / self.scale
    }

    /// Record the outcome of one optimizer step.
    ///
    /// Returns whether the step should have been applied (`false` when
    /// the gradients were non-finite and the step must be skipped).
    pub fn update(&mut self, grads_finite: bool) -> bool {
        if grads_finite {
            self.good_steps += 1;
            if self.good_steps >= self.growth_interval {
                self.scale *= self.growth_factor;
                self.good_steps = 0;
            }
        } else {
            self.scale = (self.scale * self.backoff_factor).max(1.0);
            self.good_steps = 0;
        }
        grads_finite
    }
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_on_overflow() {
        let mut scaler = GradScaler::new();
        let initial = scaler.scale();

        assert!(!scaler.update(false));
        assert_eq!(scaler.scale(), initial * 0.5);
    }

    #[test]
    fn test_growth_after_clean_run() {
        let mut scaler = GradScaler::new();
        let initial = scaler.scale();

        for _ in 0..2000 {
            assert!(scaler.update(true));
        }
        assert_eq!(scaler.scale(), initial * 2.0);
    }

    #[test]
    fn test_overflow_resets_growth_run() {
        let mut scaler = GradScaler::new();
        for _ in 0..1999 {
            scaler.update(true);
        }
        scaler.update(false);
        let after_backoff = scaler.scale();

        scaler.update(true);
        assert_eq!(scaler.scale(), after_backoff);
    }

    #[test]
    fn test_scale_floor() {
        let mut scaler = GradScaler::new();
        for _ in 0..64 {
            scaler.update(false);
        }
        assert!(scaler.scale() >= 1.0);
    }
}
