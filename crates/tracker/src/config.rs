use std::time::Duration;
use tracenav_discovery::RetryPolicy;

/// Tuning knobs for a tracking session.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Cadence of the quiet-period poll.
    pub poll_interval: Duration,
    /// How long a buffer must sit idle before its batch flushes.
    pub quiet_window: Duration,
    /// Hard per-buffer item limit; crossing it opens the overload valve.
    pub max_pending: usize,
    /// Cadence of the quiescence poll while overloaded.
    pub rebuild_poll: Duration,
    /// Upper bound on the quiescence wait before rebuilding anyway.
    pub rebuild_max_wait: Duration,
    /// Depth of each worker queue; a full queue drops the flushed batch.
    pub queue_depth: usize,
    /// Retry settings applied to every provider invocation.
    pub retry: RetryPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            quiet_window: Duration::from_secs(5),
            max_pending: 200,
            rebuild_poll: Duration::from_secs(1),
            rebuild_max_wait: Duration::from_secs(10),
            queue_depth: 16,
            retry: RetryPolicy::fast(),
        }
    }
}
