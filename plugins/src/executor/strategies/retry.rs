use std::time::Duration;

use buildseq_core::api::{BuildError, RetryConfig, RetryStrategyPlugin};

/// Delay doubles per failure, capped at `max_delay_ms`.
pub struct ExponentialBackoffPlugin {
    config: RetryConfig,
}

/// Delay grows by `base_delay_ms` per failure, capped at `max_delay_ms`.
pub struct LinearRetryPlugin {
    config: RetryConfig,
}

impl ExponentialBackoffPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryStrategyPlugin for ExponentialBackoffPlugin {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32, _error: &BuildError) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }
        let exp = 1u64 << attempt.saturating_sub(1).min(30);
        let delay = self.config.base_delay_ms.saturating_mul(exp);
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32, _error: &BuildError) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }
        let multiplier = attempt.max(1) as u64;
        let delay = self.config.base_delay_ms.saturating_mul(multiplier);
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable() -> BuildError {
        BuildError::service_unavailable("502")
    }

    #[test]
    fn test_exponential_backoff() {
        let cfg = RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            max_attempts: 4,
            strategy: "exponential-backoff".to_string(),
        };
        let plugin = ExponentialBackoffPlugin::new(cfg);
        assert_eq!(plugin.next_delay(1, &unavailable()).unwrap().as_millis(), 100);
        assert_eq!(plugin.next_delay(2, &unavailable()).unwrap().as_millis(), 200);
        assert_eq!(plugin.next_delay(3, &unavailable()).unwrap().as_millis(), 400);
        assert_eq!(plugin.next_delay(4, &unavailable()), None);
    }

    #[test]
    fn test_linear_backoff() {
        let cfg = RetryConfig {
            base_delay_ms: 50,
            max_delay_ms: 120,
            max_attempts: 4,
            strategy: "linear".to_string(),
        };
        let plugin = LinearRetryPlugin::new(cfg);
        assert_eq!(plugin.next_delay(1, &unavailable()).unwrap().as_millis(), 50);
        assert_eq!(plugin.next_delay(2, &unavailable()).unwrap().as_millis(), 100);
        assert_eq!(plugin.next_delay(3, &unavailable()).unwrap().as_millis(), 120);
    }

    #[test]
    fn non_retryable_errors_are_never_retried() {
        let plugin = ExponentialBackoffPlugin::new(RetryConfig::default());
        assert!(plugin.should_retry(1, &unavailable()));
        assert!(!plugin.should_retry(1, &BuildError::file_write("read-only fs")));
        assert!(!plugin.should_retry(3, &unavailable()));
    }
}
