//! Reconnect backoff policy
//!
//! `delay(attempt) = min(base_delay * multiplier^attempt, max_delay)`, no jitter.

use crate::error::ConfigError;
use std::time::Duration;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Immutable backoff configuration shared by every subscription of a manager
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Result<Self, ConfigError> {
        if base_delay.is_zero() {
            return Err(ConfigError::invalid(
                "base_delay",
                format!("{:?}", base_delay),
                "must be positive",
            ));
        }
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return Err(ConfigError::invalid(
                "multiplier",
                multiplier,
                "must be a finite number > 1",
            ));
        }
        if max_delay < base_delay {
            return Err(ConfigError::invalid(
                "max_delay",
                format!("{:?}", max_delay),
                "must be >= base_delay",
            ));
        }
        if max_attempts == 0 {
            return Err(ConfigError::invalid(
                "max_attempts",
                max_attempts,
                "must be >= 1",
            ));
        }
        Ok(Self {
            base_delay,
            multiplier,
            max_delay,
            max_attempts,
        })
    }

    /// Delay before reconnect number `attempt` (zero-based), capped at `max_delay`
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        // powi saturates to +inf on overflow, which min() folds into the cap
        let delay = (base * self.multiplier.powi(exponent)).min(max);
        Duration::from_secs_f64(delay)
    }

    /// Whether another reconnect may be scheduled after `attempts` reconnects
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}
