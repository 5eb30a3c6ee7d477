//! Backoff policy for failed sink writes.
//!
//! Whether a failed batch is retried at all is decided by the writer's
//! failure callback; this module only answers how long to wait first.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Initial backoff duration
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff)
    pub multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts. Used by tests and `--once` runs.
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Backoff to wait before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = if scaled.is_finite() {
            Duration::from_secs_f64(scaled.clamp(0.0, self.max_backoff.as_secs_f64()))
        } else {
            self.max_backoff
        };

        if self.jitter && !capped.is_zero() {
            let jitter_ms = rand::random::<f64>() * capped.as_millis() as f64 * 0.1;
            capped + Duration::from_millis(jitter_ms as u64)
        } else {
            capped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(350));
        assert_eq!(config.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(10),
            multiplier: 1.0,
            jitter: true,
        };

        for _ in 0..20 {
            let backoff = config.backoff(3);
            assert!(backoff >= Duration::from_millis(1000));
            assert!(backoff <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_immediate_never_waits() {
        let config = RetryConfig::immediate();
        assert_eq!(config.backoff(0), Duration::ZERO);
        assert_eq!(config.backoff(7), Duration::ZERO);
    }
}
