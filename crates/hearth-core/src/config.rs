use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunable timings and limits for the synchronization core.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding the disk cache entries.
    pub cache_dir: PathBuf,

    /// Cached payloads younger than this are considered fresh. Older entries
    /// are still served for instant display, but flagged stale so the UI may
    /// show a loading affordance while the background refresh runs.
    pub staleness_threshold: Duration,

    /// Eviction horizon: entries older than this are dropped by
    /// `evict_stale()` and by the cleanup pass on a failed cache write.
    pub cache_max_age: Duration,

    /// Newest-N window kept in each per-thread message cache. Older entries
    /// fall off the front.
    pub message_cache_window: usize,

    /// How long a released channel registration lingers before teardown, so
    /// a release immediately followed by a re-acquire keeps the connection
    /// alive. Zero gives plain refcounting with immediate teardown.
    pub teardown_delay: Duration,

    /// First reconnect delay; doubles on each consecutive failure.
    pub backoff_base: Duration,

    /// Upper bound on the reconnect delay.
    pub backoff_max: Duration,

    /// Consecutive failures after which fallback polling starts. Reconnects
    /// keep being attempted opportunistically at `backoff_max` cadence.
    pub backoff_max_attempts: u32,

    /// Forced-refetch cadence while the push path is down.
    pub fallback_poll_interval: Duration,
}

impl SyncConfig {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            staleness_threshold: Duration::from_secs(30),
            cache_max_age: Duration::from_secs(24 * 60 * 60),
            message_cache_window: 50,
            teardown_delay: Duration::from_millis(300),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            backoff_max_attempts: 5,
            fallback_poll_interval: Duration::from_secs(10),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        let dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hearth");
        Self::new(dir)
    }
}
