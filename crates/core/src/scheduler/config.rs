//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the job scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of jobs executing at once. Must be at least 1.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Fallback wake-up interval for the dispatch loop (milliseconds).
    /// The loop is also woken whenever a job is registered or finishes.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long a cancelled execution may take to stop before it is
    /// aborted (milliseconds).
    #[serde(default = "default_cancel_timeout")]
    pub cancel_timeout_ms: u64,

    /// Finished jobs kept for lookup; older ones are evicted (0 = keep all).
    #[serde(default = "default_max_finished_jobs")]
    pub max_finished_jobs: usize,
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_poll_interval() -> u64 {
    1000 // 1 second
}

fn default_cancel_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_max_finished_jobs() -> usize {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            poll_interval_ms: default_poll_interval(),
            cancel_timeout_ms: default_cancel_timeout(),
            max_finished_jobs: default_max_finished_jobs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.cancel_timeout_ms, 10_000);
        assert_eq!(config.max_finished_jobs, 1000);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            max_concurrent_jobs = 4
            cancel_timeout_ms = 250
        "#;
        let config: SchedulerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.cancel_timeout_ms, 250);
        assert_eq!(config.poll_interval_ms, 1000);
    }
}
