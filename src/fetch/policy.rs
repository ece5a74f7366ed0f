use std::time::Duration;

use crate::error::AppError;

/// Exponential backoff settings for one fetch.
///
/// The wait after failed attempt `n` is
/// `min(initial_delay * backoff_multiplier^(n-1), max_delay)`. With a
/// non-zero `jitter` up to that fraction of the base delay is added on top,
/// still capped at `max_delay`. `jitter` may not exceed
/// `backoff_multiplier - 1`, which keeps successive waits non-decreasing.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(4),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_attempts < 1 {
            return Err(AppError::Validation(
                "max_attempts must be at least 1".into(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 1.0 {
            return Err(AppError::Validation(format!(
                "backoff_multiplier must be greater than 1, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(AppError::Validation(format!(
                "jitter must be within [0, 1], got {}",
                self.jitter
            )));
        }
        if self.jitter > self.backoff_multiplier - 1.0 {
            return Err(AppError::Validation(format!(
                "jitter {} exceeds backoff_multiplier - 1 ({})",
                self.jitter,
                self.backoff_multiplier - 1.0
            )));
        }
        Ok(())
    }

    /// Deterministic part of the wait after failed attempt `attempt` (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * factor;

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Wait to apply after failed attempt `attempt`, jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter.is_nan() || self.jitter <= 0.0 {
            return base;
        }

        let spread = base.as_secs_f64() * self.jitter * fastrand::f64();
        let spread = Duration::try_from_secs_f64(spread).unwrap_or(self.max_delay);
        base.saturating_add(spread).min(self.max_delay)
    }
}
