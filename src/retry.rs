//! Retry policy and backoff schedule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Backoff strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Constant,
    Linear,
    Exponential,
}

/// Per-step retry configuration. A step without one gets a single try with
/// immediate failure propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total tries, counting the first. Bounds how often the backoff
    /// schedule is consulted; independent of the formula itself.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Base wait in milliseconds.
    #[serde(default = "default_min_interval")]
    pub min_interval: i64,

    /// Wait ceiling in milliseconds.
    #[serde(default = "default_max_interval")]
    pub max_interval: i64,
}

fn default_max_attempts() -> i64 {
    3
}

fn default_min_interval() -> i64 {
    1000
}

fn default_max_interval() -> i64 {
    10000
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            strategy: BackoffStrategy::default(),
            min_interval: default_min_interval(),
            max_interval: default_max_interval(),
        }
    }
}

impl RetryConfig {
    /// Bounds checks, aggregated.
    pub fn validate(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        if self.max_attempts >= 300 {
            errors.push(Error::Validation(
                "max_attempts must be less than 300".to_string(),
            ));
        }
        if self.min_interval < 0 || self.min_interval >= 100000 {
            errors.push(Error::Validation(
                "min_interval must be between 0 and 100000".to_string(),
            ));
        }
        if self.max_interval < 0 || self.max_interval >= 1000000 {
            errors.push(Error::Validation(
                "max_interval must be between 0 and 1000000".to_string(),
            ));
        }
        if self.min_interval >= self.max_interval {
            errors.push(Error::Validation(
                "min_interval must be smaller than max_interval".to_string(),
            ));
        }
        errors
    }

    /// Wait duration before the given try.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        backoff(
            self.strategy,
            self.min_interval.max(0) as u64,
            self.max_interval.max(0) as u64,
            attempt,
        )
    }
}

/// Pure backoff schedule. `attempt` is 1-based and counts the current try,
/// so attempt 1 never waits. Arithmetic saturates before clamping to
/// `max_interval`.
pub fn backoff(
    strategy: BackoffStrategy,
    min_interval: u64,
    max_interval: u64,
    attempt: u32,
) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    let millis = match strategy {
        BackoffStrategy::Constant => min_interval,
        BackoffStrategy::Linear => min_interval
            .saturating_mul(attempt as u64 - 1)
            .min(max_interval),
        BackoffStrategy::Exponential => {
            let exponent = attempt - 2;
            let factor = if exponent >= 63 {
                u64::MAX
            } else {
                1u64 << exponent
            };
            min_interval.saturating_mul(factor).min(max_interval)
        }
    };
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_constant_backoff() {
        let cases = [(1, 0), (2, 1000), (3, 1000)];
        for (attempt, expected) in cases {
            assert_eq!(
                backoff(BackoffStrategy::Constant, 1000, 10000, attempt),
                ms(expected),
                "attempt {}",
                attempt
            );
        }
    }

    #[test]
    fn test_linear_backoff() {
        let cases = [(1, 0), (2, 500), (3, 1000), (4, 1500), (5, 2000), (100, 4000)];
        for (attempt, expected) in cases {
            assert_eq!(
                backoff(BackoffStrategy::Linear, 500, 4000, attempt),
                ms(expected),
                "attempt {}",
                attempt
            );
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let cases = [
            (1, 0),
            (2, 500),
            (3, 1000),
            (4, 2000),
            (5, 4000),
            (6, 8000),
            (8, 32000),
            (10, 50000),
        ];
        for (attempt, expected) in cases {
            assert_eq!(
                backoff(BackoffStrategy::Exponential, 500, 50000, attempt),
                ms(expected),
                "attempt {}",
                attempt
            );
        }
    }

    #[test]
    fn test_exponential_saturates_instead_of_overflowing() {
        assert_eq!(
            backoff(BackoffStrategy::Exponential, 500, 60000, 200),
            ms(60000)
        );
    }

    #[test]
    fn test_defaults() {
        let config: RetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.strategy, BackoffStrategy::Constant);
        assert_eq!(config.min_interval, 1000);
        assert_eq!(config.max_interval, 10000);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_bounds_validation() {
        let config = RetryConfig {
            max_attempts: 300,
            min_interval: 100000,
            max_interval: 1000000,
            ..Default::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 3);

        let inverted = RetryConfig {
            min_interval: 5000,
            max_interval: 1000,
            ..Default::default()
        };
        assert_eq!(inverted.validate().len(), 1);
    }

    #[test]
    fn test_backoff_for_uses_config_intervals() {
        let config = RetryConfig {
            strategy: BackoffStrategy::Exponential,
            min_interval: 500,
            max_interval: 50000,
            ..Default::default()
        };
        assert_eq!(config.backoff_for(4), ms(2000));
    }
}
