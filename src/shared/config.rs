//! Job engine configuration
//!
//! Environment-driven configuration for the job execution core.
//! Unknown or malformed values fall back to the documented defaults.

use std::time::Duration;
use tracing::warn;

/// Default worker pool capacity
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default whole-job deadline (24 hours)
pub const DEFAULT_JOB_TIMEOUT_SECONDS: u64 = 86_400;

/// Default retry budget for transient store errors
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Number of failed batches that triggers an automatic requeue
pub const CONSECUTIVE_FAILURE_THRESHOLD: usize = 3;

/// Base delay between transient-error retries; actual delay is
/// `RETRY_DELAY * attempt` (linear-exponential back-off).
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Job engine configuration
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Maximum concurrent workers in the shared pool
    pub max_workers: usize,
    /// Wall-clock deadline for a whole job run, in seconds
    pub job_timeout_seconds: u64,
    /// Maximum retries for transient store errors
    pub max_retries: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            job_timeout_seconds: DEFAULT_JOB_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl JobConfig {
    /// Loads configuration from environment variables
    ///
    /// # Environment Variables
    /// - `MAX_JOB_WORKERS`: Worker pool capacity (default: 4)
    /// - `JOB_TIMEOUT_SECONDS`: Per-job deadline in seconds (default: 86400)
    /// - `JOB_MAX_RETRIES`: Transient-error retry budget (default: 3)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("MAX_JOB_WORKERS") {
            match raw.parse::<usize>() {
                Ok(val) if val > 0 => config.max_workers = val,
                _ => warn!("Ignoring invalid MAX_JOB_WORKERS value: {}", raw),
            }
        }

        if let Ok(raw) = std::env::var("JOB_TIMEOUT_SECONDS") {
            match raw.parse::<u64>() {
                Ok(val) if val > 0 => config.job_timeout_seconds = val,
                _ => warn!("Ignoring invalid JOB_TIMEOUT_SECONDS value: {}", raw),
            }
        }

        if let Ok(raw) = std::env::var("JOB_MAX_RETRIES") {
            match raw.parse::<u32>() {
                Ok(val) => config.max_retries = val,
                _ => warn!("Ignoring invalid JOB_MAX_RETRIES value: {}", raw),
            }
        }

        config
    }

    /// Per-job deadline as a `Duration`
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.job_timeout_seconds, 86_400);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_invalid_env_falls_back() {
        // Serialized via a unique var set; from_env reads the process env,
        // so use values no other test sets.
        std::env::set_var("MAX_JOB_WORKERS", "not-a-number");
        std::env::set_var("JOB_TIMEOUT_SECONDS", "-5");
        let config = JobConfig::from_env();
        assert_eq!(config.max_workers, DEFAULT_MAX_WORKERS);
        assert_eq!(config.job_timeout_seconds, DEFAULT_JOB_TIMEOUT_SECONDS);
        std::env::remove_var("MAX_JOB_WORKERS");
        std::env::remove_var("JOB_TIMEOUT_SECONDS");
    }
}
