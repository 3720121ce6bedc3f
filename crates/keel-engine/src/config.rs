use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the entry service's reader loops and caches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntryServiceConfig {
    /// Bound on the cache's transient (append pre-fetch) tier; the oldest
    /// transient is evicted beyond it. Pinned entries never count.
    pub intention_cache_cap: usize,

    /// Initial idle sleep of the IO loop at the log tail. Also used as the
    /// intention loop's idle backoff.
    pub tail_poll_interval: Duration,

    /// Ceiling for the exponential tail-poll backoff, which resets whenever
    /// the loop makes progress.
    pub tail_poll_ceiling: Duration,
}

impl Default for EntryServiceConfig {
    fn default() -> Self {
        Self {
            intention_cache_cap: 16,
            tail_poll_interval: Duration::from_millis(1),
            tail_poll_ceiling: Duration::from_millis(16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EntryServiceConfig::default();
        assert_eq!(config.intention_cache_cap, 16);
        assert_eq!(config.tail_poll_interval, Duration::from_millis(1));
        assert!(config.tail_poll_ceiling >= config.tail_poll_interval);
    }
}
