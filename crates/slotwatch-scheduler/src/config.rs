//! Scheduler configuration and delay calculation.

use std::time::Duration;

use rand::Rng;

use crate::error::{Result, SchedulerError};

/// No delay is ever shorter than this, whatever `min_delay` says.
pub const MIN_DELAY_FLOOR: Duration = Duration::from_secs(1);

/// Timing parameters of the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Mean time between invocations.
    pub base_interval: Duration,
    /// Relative jitter applied to each delay, in `[0, 1)`.
    pub jitter_ratio: f64,
    /// Lower bound of any delay.
    pub min_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(60),
            jitter_ratio: 0.2,
            min_delay: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    /// Creates a config with the given base interval and default jitter.
    #[must_use]
    pub fn new(base_interval: Duration) -> Self {
        Self {
            base_interval,
            ..Self::default()
        }
    }

    /// Sets the jitter ratio.
    #[must_use]
    pub const fn with_jitter(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio;
        self
    }

    /// Sets the minimum delay.
    #[must_use]
    pub const fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` for a zero base interval, a
    /// jitter ratio outside `[0, 1)` or a minimum delay below one second.
    pub fn validate(&self) -> Result<()> {
        validate_interval(self.base_interval)?;
        if !(0.0..1.0).contains(&self.jitter_ratio) {
            return Err(SchedulerError::InvalidConfig(format!(
                "jitter_ratio must be in [0, 1), got {}",
                self.jitter_ratio
            )));
        }
        if self.min_delay < MIN_DELAY_FLOOR {
            return Err(SchedulerError::InvalidConfig(format!(
                "min_delay must be at least {}s, got {}ms",
                MIN_DELAY_FLOOR.as_secs(),
                self.min_delay.as_millis()
            )));
        }
        Ok(())
    }

    /// Draws the next delay.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        let sample = if self.jitter_ratio > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        jittered_delay(self.base_interval, self.jitter_ratio, self.min_delay, sample)
    }
}

pub(crate) fn validate_interval(base: Duration) -> Result<()> {
    if base.is_zero() {
        return Err(SchedulerError::InvalidConfig(
            "base_interval must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Computes `floor(base_ms * (1 + ratio * sample))` milliseconds, clamped to
/// `min_delay` and never below [`MIN_DELAY_FLOOR`].
///
/// `sample` is a uniform draw from `[-1, 1]`.
#[must_use]
pub fn jittered_delay(base: Duration, ratio: f64, min_delay: Duration, sample: f64) -> Duration {
    let base_ms = base.as_millis() as f64;
    let ms = (base_ms * (1.0 + ratio * sample.clamp(-1.0, 1.0))).floor();
    Duration::from_millis(ms.max(0.0) as u64)
        .max(min_delay)
        .max(MIN_DELAY_FLOOR)
}
