//! Time abstraction for deterministic testing
//!
//! The dispatcher, rate limiter and reconciler all take time-based decisions
//! (token refill, backoff scheduling, lock expiry). This trait lets production
//! code run on real system time while tests drive a controlled mock clock
//! without actual delays.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Trait for time operations to enable deterministic testing
pub trait Clock: Send + Sync + 'static {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Get seconds since UNIX epoch
    fn epoch_secs(&self) -> i64 {
        let secs =
            self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        i64::try_from(secs).unwrap_or(i64::MAX)
    }
}

/// Real system clock implementation for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Implement Clock for Arc<T> where T: Clock for convenient cloning
impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn system_time(&self) -> SystemTime {
        (**self).system_time()
    }
}

/// Mock clock for deterministic testing
///
/// Starts at a fixed wall-clock epoch so tests can assert on exact
/// `next_attempt_at` values, and only moves when advanced explicitly.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    epoch_base: SystemTime,
    elapsed: Arc<Mutex<Duration>>,
}

/// Wall-clock origin for `MockClock`; an arbitrary fixed point in late 2023.
const MOCK_EPOCH_BASE_SECS: u64 = 1_700_000_000;

impl MockClock {
    /// Create a new mock clock at the fixed wall-clock origin
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            epoch_base: UNIX_EPOCH + Duration::from_secs(MOCK_EPOCH_BASE_SECS),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed += duration;
        }
    }

    /// Advance the mock clock by whole seconds (convenience method)
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Advance the mock clock by milliseconds (convenience method)
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Get the current elapsed time
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or(Duration::ZERO)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.epoch_base + self.elapsed()
    }
}
