//! QoS 1 publish retry policy and the sleep it waits with

use crate::config::ClientConfig;
use async_trait::async_trait;
use std::time::Duration;

/// Bounded fixed-interval retry: one first attempt plus `max_retries` resends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            interval: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.retry.max_retries,
            interval: config.retry_interval(),
        }
    }

    /// Total PUBLISH sends allowed before giving up
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Waits between publish attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_allows_eleven_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 10);
        assert_eq!(policy.max_attempts(), 11);
        assert_eq!(policy.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = ClientConfig::default();
        config.retry.max_retries = 3;
        config.retry.interval_ms = 250;

        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.interval, Duration::from_millis(250));
    }

    #[test]
    fn test_max_attempts_saturates() {
        let policy = RetryPolicy {
            max_retries: u32::MAX,
            interval: Duration::ZERO,
        };
        assert_eq!(policy.max_attempts(), u32::MAX);
    }

    #[tokio::test]
    async fn test_tokio_sleeper_zero_duration_returns() {
        TokioSleeper.sleep(Duration::ZERO).await;
    }
}
