use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sequence executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on one readiness wait before the next scan.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Readiness attempts per node in a serial step.
    #[serde(default = "default_serial_attempts")]
    pub serial_ready_attempts: u32,

    /// Consecutive no-progress scans tolerated in a parallel step.
    #[serde(default = "default_idle_rounds")]
    pub parallel_idle_rounds: u32,

    /// Maximum tasks running at once inside a parallel step.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Stop a parallel step at the first failed task.
    #[serde(default)]
    pub fail_fast: bool,

    /// Visual progress bar (text output only).
    #[serde(default)]
    pub progress_bar: bool,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_serial_attempts() -> u32 {
    10
}

fn default_idle_rounds() -> u32 {
    30
}

fn default_max_concurrency() -> usize {
    num_cpus::get().max(1)
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            serial_ready_attempts: default_serial_attempts(),
            parallel_idle_rounds: default_idle_rounds(),
            max_concurrency: default_max_concurrency(),
            fail_fast: false,
            progress_bar: false,
        }
    }
}

impl ExecutorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Handler-level retry settings for retryable failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}
