use std::str::FromStr;
use std::time::Duration;

use clipforge_core::retry::RetryPolicy;

use crate::processor::PollConfig;

/// Pipeline tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Retry policy for the generation call.
    pub retry: RetryPolicy,
    /// Poll loop bounds for pending predictions.
    pub poll: PollConfig,
    /// Ask the provider to hold prediction requests open until they finish.
    pub sync_wait: bool,
    /// Call the provider's credential check before the first task of a job.
    pub verify_credential: bool,
    /// Maximum number of jobs processed concurrently.
    pub workers: usize,
    /// Jobs that started longer ago than this are removed by the retention
    /// sweep.
    pub retention_hours: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            poll: PollConfig::default(),
            sync_wait: false,
            verify_credential: true,
            workers: 2,
            retention_hours: 24,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default |
    /// |--------------------------|---------|
    /// | `RETRY_MAX_ATTEMPTS`     | `2`     |
    /// | `RETRY_BASE_DELAY_SECS`  | `2`     |
    /// | `POLL_INTERVAL_SECS`     | `5`     |
    /// | `MAX_POLL_ATTEMPTS`      | `60`    |
    /// | `PROVIDER_SYNC_WAIT`     | `false` |
    /// | `VERIFY_CREDENTIAL`      | `true`  |
    /// | `JOB_WORKERS`            | `2`     |
    /// | `JOB_RETENTION_HOURS`    | `24`    |
    pub fn from_env() -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: env_or("RETRY_MAX_ATTEMPTS", 2),
                base_delay: Duration::from_secs(env_or("RETRY_BASE_DELAY_SECS", 2)),
            },
            poll: PollConfig {
                interval: Duration::from_secs(env_or("POLL_INTERVAL_SECS", 5)),
                max_attempts: env_or("MAX_POLL_ATTEMPTS", 60),
            },
            sync_wait: env_or("PROVIDER_SYNC_WAIT", false),
            verify_credential: env_or("VERIFY_CREDENTIAL", true),
            workers: env_or("JOB_WORKERS", 2),
            retention_hours: env_or("JOB_RETENTION_HOURS", 24),
        }
    }
}

/// Read and parse `key`, falling back to `default` when unset.
///
/// Panics on an unparseable value so misconfiguration fails at startup.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}
