use std::time::Duration;

use crate::error::BuildError;

/// Retry strategy plugin, consulted for retryable handler failures.
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn next_delay(&self, attempt: u32, error: &BuildError) -> Option<Duration>;
    fn max_attempts(&self) -> u32;
    fn should_retry(&self, attempt: u32, error: &BuildError) -> bool {
        attempt < self.max_attempts() && error.is_retryable() && !self.is_fatal_error(error)
    }
    fn is_fatal_error(&self, _error: &BuildError) -> bool {
        false
    }
}
