use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::ReconnectSettings;

/// Exponential reconnect schedule with bounded jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: Duration::from_millis(500),
        }
    }
}

impl From<&ReconnectSettings> for ReconnectPolicy {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            initial: settings.initial,
            max: settings.max,
            multiplier: settings.multiplier,
            jitter: settings.jitter,
        }
    }
}

impl ReconnectPolicy {
    /// `initial · multiplier^attempt`, capped at `max`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }

    /// Base delay plus `entropy % jitter`.
    pub fn delay(&self, attempt: u32, entropy: u64) -> Duration {
        let base = self.base_delay(attempt);
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return base;
        }
        base.saturating_add(Duration::from_millis(entropy % jitter_ms))
    }
}

pub(crate) fn clock_entropy() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64
}
