//! Exponential backoff with jitter for the accept loop.

use std::time::Duration;

use rand::Rng;

use crate::config::AcceptConfig;

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// How the accept loop reacts to a run of transient accept errors.
///
/// Each consecutive error waits a little longer; a successful accept resets
/// the count. With `max_consecutive` set, the run is cut short and the last
/// error is treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptRetryPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    /// 0 means unlimited.
    pub max_consecutive: u32,
}

impl AcceptRetryPolicy {
    /// Delay before the next accept after `consecutive` transient errors.
    pub fn delay(&self, consecutive: u32) -> Duration {
        calculate_backoff(consecutive, self.base_ms, self.max_ms)
    }

    /// Whether `consecutive` transient errors exhaust the policy.
    pub fn is_exhausted(&self, consecutive: u32) -> bool {
        self.max_consecutive != 0 && consecutive >= self.max_consecutive
    }
}

impl Default for AcceptRetryPolicy {
    fn default() -> Self {
        Self::from(&AcceptConfig::default())
    }
}

impl From<&AcceptConfig> for AcceptRetryPolicy {
    fn from(config: &AcceptConfig) -> Self {
        Self {
            base_ms: config.backoff_base_ms,
            max_ms: config.backoff_max_ms,
            max_consecutive: config.max_consecutive_errors,
        }
    }
}
