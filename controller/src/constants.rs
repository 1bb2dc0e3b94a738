//! Central repository for scheduling constants and default settings
//!
//! Organized by category so the reconciliation timings live in one place.

use std::time::Duration;

/// Scheduling and requeue timings
pub mod scheduling {
    use super::Duration;

    /// Missed cron firings tolerated before the schedule is treated as misconfigured
    pub const MAX_MISSED_START_TIMES: u32 = 100;

    /// Minimum time between two dispatches of the same request
    pub const DEBOUNCE_WINDOW_SECONDS: i64 = 30;

    /// Delay before re-checking an in-progress collection or retrying a failed status write
    pub const REQUEUE_AFTER: Duration = Duration::from_secs(20);
}

/// Backoff applied to reconciliations that fail with a non-transient error
pub mod backoff {
    use super::Duration;

    pub const BASE_DELAY: Duration = Duration::from_secs(1);

    pub const MAX_DELAY: Duration = Duration::from_secs(300);
}

/// Default configuration values
pub mod defaults {
    /// Collector worker pool size
    pub const COLLECTOR_WORKERS: usize = 10;

    /// Reconciliations run serially to keep reverse-index updates ordered
    pub const MAX_CONCURRENT_RECONCILES: usize = 1;

    /// Hours a finished collector job is remembered
    pub const JOB_RETENTION_HOURS: i64 = 48;

    /// Interval of the collector job cleanup task
    pub const CLEANUP_INTERVAL_SECONDS: u64 = 3600;

    pub const HOST: &str = "0.0.0.0";

    pub const PORT: u16 = 8096;

    pub const DATABASE_PATH: &str = "data/requests.db";
}
