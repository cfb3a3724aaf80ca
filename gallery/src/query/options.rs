use crate::keys::QueryCategory;
use shared::Millis;
use std::time::Duration;

/// Per-call behaviour of [`QueryStore::get`](super::QueryStore::get).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_after: Millis,
    pub evict_after: Millis,
    /// When false no fetch is issued; cached data is still returned.
    pub enabled: bool,
    /// Extra attempts after the first failure.
    pub retry_count: u32,
    /// First backoff delay; doubles per attempt up to [`MAX_RETRY_DELAY`].
    pub retry_delay: Duration,
}

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

impl QueryOptions {
    pub fn for_category(category: QueryCategory) -> Self {
        Self {
            stale_after: category.stale_after(),
            evict_after: category.evict_after(),
            enabled: true,
            retry_count: category.retry_count(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn stale_after(mut self, stale_after: Millis) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn evict_after(mut self, evict_after: Millis) -> Self {
        self.evict_after = evict_after;
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_after: Millis::from_mins(10),
            evict_after: Millis::from_hours(24),
            enabled: true,
            retry_count: 1,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}
