//! Per-destination throughput control
//!
//! Each destination gets a token bucket (requests per second) paired with a
//! semaphore (simultaneous in-flight calls). The dispatcher must hold both a
//! concurrency permit and a token before claiming an item; items that cannot
//! get them are deferred, not failed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use courier_domain::{DestinationConfig, RateLimit};
use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};

// Tokens are tracked in thousandths so sub-second refill stays exact.
const MILLI: u64 = 1_000;

/// Token bucket refilled continuously at a fixed rate.
///
/// Capacity equals the refill rate, so at most `rps` calls start in any
/// one-second window and bursts cannot exceed one second's allowance.
pub struct TokenBucket<C: Clock = SystemClock> {
    capacity_milli: u64,
    refill_per_sec: u64,
    tokens_milli: Arc<AtomicU64>,
    last_refill: Arc<RwLock<Instant>>,
    clock: Arc<C>,
}

impl<C: Clock> TokenBucket<C> {
    /// Create a bucket allowing `rps` acquisitions per second, starting
    /// full.
    pub fn with_clock(rps: u32, clock: C) -> Self {
        let rps = u64::from(rps.max(1));
        Self {
            capacity_milli: rps * MILLI,
            refill_per_sec: rps,
            tokens_milli: Arc::new(AtomicU64::new(rps * MILLI)),
            last_refill: Arc::new(RwLock::new(clock.now())),
            clock: Arc::new(clock),
        }
    }

    /// Refill tokens based on elapsed time
    fn refill(&self) {
        let now = self.clock.now();

        let last_refill = match self.last_refill.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn!("Token bucket last_refill lock poisoned");
                *poisoned.into_inner()
            }
        };

        let elapsed_millis = now.duration_since(last_refill).as_millis();
        let tokens_to_add = (elapsed_millis as u64).saturating_mul(self.refill_per_sec);

        if tokens_to_add > 0 {
            let current = self.tokens_milli.load(Ordering::Acquire);
            let refilled = current.saturating_add(tokens_to_add).min(self.capacity_milli);
            self.tokens_milli.store(refilled, Ordering::Release);

            if let Ok(mut guard) = self.last_refill.write() {
                *guard = now;
            }
        }
    }

    /// Try to consume one token.
    pub fn try_acquire(&self) -> bool {
        self.refill();

        let mut current = self.tokens_milli.load(Ordering::Acquire);
        loop {
            if current < MILLI {
                debug!(available_milli = current, "Rate limit: no token available");
                return false;
            }

            match self.tokens_milli.compare_exchange_weak(
                current,
                current - MILLI,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Whole tokens currently available.
    pub fn available_tokens(&self) -> u64 {
        self.refill();
        self.tokens_milli.load(Ordering::Acquire) / MILLI
    }
}

impl TokenBucket<SystemClock> {
    /// Create a bucket on the system clock.
    pub fn new(rps: u32) -> Self {
        Self::with_clock(rps, SystemClock)
    }
}

impl<C: Clock> Clone for TokenBucket<C> {
    fn clone(&self) -> Self {
        Self {
            capacity_milli: self.capacity_milli,
            refill_per_sec: self.refill_per_sec,
            tokens_milli: Arc::clone(&self.tokens_milli),
            last_refill: Arc::clone(&self.last_refill),
            clock: Arc::clone(&self.clock),
        }
    }
}

/// Combined rate and concurrency gate for one destination.
pub struct DestinationLimiter<C: Clock = SystemClock> {
    limits: RateLimit,
    bucket: TokenBucket<C>,
    concurrency: Arc<Semaphore>,
}

impl<C: Clock> DestinationLimiter<C> {
    pub fn with_clock(limits: RateLimit, clock: C) -> Self {
        Self {
            limits,
            bucket: TokenBucket::with_clock(limits.rps, clock),
            concurrency: Arc::new(Semaphore::new(limits.max_concurrency.max(1) as usize)),
        }
    }

    /// Try to admit one delivery.
    ///
    /// Takes the concurrency slot before spending a token so a full
    /// pipeline never burns rate budget it cannot use. The returned permit
    /// must be held for the duration of the adapter call.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        let permit = Arc::clone(&self.concurrency).try_acquire_owned().ok()?;
        if self.bucket.try_acquire() {
            Some(permit)
        } else {
            drop(permit);
            None
        }
    }

    /// The limits this gate was built from.
    pub fn limits(&self) -> RateLimit {
        self.limits
    }

    /// Requests-per-second budget, used for deferral spacing.
    pub fn rps(&self) -> u32 {
        self.limits.rps
    }
}

/// Lazily built map of destination id to limiter.
///
/// Limiters are shared across dispatch cycles so in-flight permits and
/// spent tokens survive between polls. A destination whose configured
/// limits change gets a fresh limiter on next use.
pub struct LimiterRegistry<C: Clock + Clone = SystemClock> {
    limiters: DashMap<String, Arc<DestinationLimiter<C>>>,
    clock: C,
}

impl LimiterRegistry<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for LimiterRegistry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> LimiterRegistry<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { limiters: DashMap::new(), clock }
    }

    /// Get or create the limiter for a destination.
    pub fn limiter(&self, config: &DestinationConfig) -> Arc<DestinationLimiter<C>> {
        if let Some(existing) = self.limiters.get(&config.destination_id) {
            if existing.limits() == config.rate_limit {
                return Arc::clone(&existing);
            }
        }

        let fresh =
            Arc::new(DestinationLimiter::with_clock(config.rate_limit, self.clock.clone()));
        self.limiters.insert(config.destination_id.clone(), Arc::clone(&fresh));
        fresh
    }
}
