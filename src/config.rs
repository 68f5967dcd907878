//! Configuration types.

use std::time::Duration;

/// Dispatch and orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum time a worker's poll call blocks waiting for work.
    pub long_poll_timeout: Duration,
    /// Internal sleep between checks while long-polling or sync-waiting.
    pub poll_interval: Duration,
    /// How long a synchronous job-status wait blocks before giving up.
    pub sync_wait_ttl: Duration,
    /// Stall reaper sweep interval.
    pub reaper_interval: Duration,
    /// A machine that has not pinged within this window is considered stalled.
    pub machine_stall_timeout: Duration,
    /// Optional bound on how long an approval may stay undecided.
    /// `None` means approval-pending jobs are exempt from timeout indefinitely.
    pub approval_timeout: Option<Duration>,
    /// Default per-job timeout when the function config does not set one.
    pub default_job_timeout_seconds: u32,
    /// Default attempt budget when the function config sets no retry count.
    pub default_max_attempts: u32,
    /// Service definitions expire unless refreshed within this window.
    pub service_definition_ttl: Duration,
    /// Absolute cap on messages in a single run.
    pub max_run_messages: usize,
    /// Window used by the non-progress cycle heuristic.
    pub cycle_detection_window: usize,
    /// Fallback model context window when the client does not report one.
    pub default_context_window: usize,
    /// Results larger than this (serialized bytes) are moved to the blob store.
    pub max_inline_result_bytes: usize,
    /// Event writer flush interval.
    pub event_flush_interval: Duration,
    /// Event writer queue capacity; writes beyond this are dropped with a warning.
    pub event_buffer_capacity: usize,
    /// Maximum attempts to acquire the per-run mutex before dropping a resume signal.
    pub max_lock_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            long_poll_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(500),
            sync_wait_ttl: Duration::from_secs(10),
            reaper_interval: Duration::from_secs(5),
            machine_stall_timeout: Duration::from_secs(90),
            approval_timeout: None,
            default_job_timeout_seconds: 30,
            default_max_attempts: 1,
            service_definition_ttl: Duration::from_secs(120),
            max_run_messages: 100,
            cycle_detection_window: 10,
            default_context_window: 100_000,
            max_inline_result_bytes: 500 * 1024,
            event_flush_interval: Duration::from_secs(5),
            event_buffer_capacity: 1024,
            max_lock_attempts: 5,
        }
    }
}

impl Config {
    /// Build a config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_u64("FOREMAN_LONG_POLL_TIMEOUT_SECS") {
            config.long_poll_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("FOREMAN_SYNC_WAIT_TTL_SECS") {
            config.sync_wait_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("FOREMAN_REAPER_INTERVAL_SECS") {
            config.reaper_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("FOREMAN_APPROVAL_TIMEOUT_SECS") {
            config.approval_timeout = Some(Duration::from_secs(secs));
        }

        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.reaper_interval, Duration::from_secs(5));
        assert_eq!(config.default_max_attempts, 1);
        assert_eq!(config.max_inline_result_bytes, 500 * 1024);
        assert!(config.approval_timeout.is_none());
    }
}
