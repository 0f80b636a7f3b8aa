//! Retry backoff policy
//!
//! Transient failures wait `base * 2^attempt_count`, scaled by a random
//! jitter factor and capped at one hour. Rate-limited failures wait at least
//! a fixed floor, honoring a larger provider-supplied `Retry-After`.

use std::time::Duration;

use courier_domain::constants::{
    BACKOFF_JITTER_MAX, BACKOFF_JITTER_MIN, DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_CAP_SECS,
    RATE_LIMIT_MIN_DELAY_SECS,
};
use rand::Rng;

/// Delay policy applied by the dispatcher when scheduling retries.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Base delay for the first retry.
    pub base: Duration,
    /// Upper bound on any computed delay.
    pub cap: Duration,
    /// Floor for rate-limited retries.
    pub rate_limit_min: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(DEFAULT_BACKOFF_BASE_SECS),
            cap: Duration::from_secs(DEFAULT_BACKOFF_CAP_SECS),
            rate_limit_min: Duration::from_secs(RATE_LIMIT_MIN_DELAY_SECS),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt after a transient failure.
    ///
    /// `attempt_count` is the number of attempts already consumed, including
    /// the one that just failed.
    pub fn transient_delay(&self, attempt_count: i32) -> Duration {
        // 2^30 seconds is already far past any sane cap; clamping the
        // exponent keeps the f64 math exact.
        let exponent = attempt_count.clamp(0, 30) as u32;
        let raw = self.base.as_secs_f64() * f64::from(2_u32.pow(exponent).min(1 << 30));
        let jitter = rand::thread_rng().gen_range(BACKOFF_JITTER_MIN..BACKOFF_JITTER_MAX);
        Duration::from_secs_f64((raw * jitter).min(self.cap.as_secs_f64()))
    }

    /// Delay before the next attempt after the provider rate-limited us.
    ///
    /// Honors a provider-supplied `Retry-After` when it asks for more than
    /// the floor; ignores it when it asks for less.
    pub fn rate_limit_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or(self.rate_limit_min).max(self.rate_limit_min).min(self.cap)
    }
}
