//! Query cache configuration.

use std::time::Duration;

use crate::config::CacheSettings;

const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);
const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_RETRY: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a successful result counts as fresh. Zero means always stale.
    pub stale_time: Duration,
    /// How long an unobserved entry is kept before the sweep removes it.
    pub gc_time: Duration,
    /// Period of the background sweep.
    pub gc_interval: Duration,
    /// Retries after the first failed attempt.
    pub retry: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            gc_time: DEFAULT_GC_TIME,
            gc_interval: DEFAULT_GC_INTERVAL,
            retry: DEFAULT_RETRY,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            stale_time: settings.stale_time,
            gc_time: settings.gc_time,
            gc_interval: settings.gc_interval,
            retry: settings.retry,
            retry_base_delay: settings.retry_base_delay,
            retry_max_delay: settings.retry_max_delay,
        }
    }
}

impl CacheConfig {
    /// Delay before retry number `attempt` (zero-based): base doubled per attempt, capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.retry_base_delay.checked_mul(factor))
            .unwrap_or(self.retry_max_delay)
            .min(self.retry_max_delay)
    }
}
