//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! pipeline.

// Retry policy defaults
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 5;
pub const DEFAULT_BACKOFF_CAP_SECS: u64 = 3_600;
pub const BACKOFF_JITTER_MIN: f64 = 1.0;
pub const BACKOFF_JITTER_MAX: f64 = 1.3;

// Rate-limit retries wait at least this long even when the provider asks
// for less; avoids hammering a provider that is already shedding load.
pub const RATE_LIMIT_MIN_DELAY_SECS: u64 = 60;

// Dispatch defaults
pub const DEFAULT_DISPATCH_BATCH_SIZE: usize = 50;
pub const DEFAULT_DISPATCH_INTERVAL_SECS: u64 = 60;

// Reconciliation defaults
pub const DEFAULT_STUCK_THRESHOLD_SECS: i64 = 6 * 3_600;
pub const DEFAULT_RECONCILE_LOCK_TTL_SECS: i64 = 7_200;
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 6_900;
pub const DEFAULT_RECONCILE_MAX_ITEMS: usize = 3_000;
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 24 * 3_600;

/// Seed rate limits per destination: (destination_id, rps, max_concurrency).
///
/// Operators can override these through `DestinationConfig`; the table covers
/// the integrations shipped with the default adapter set.
pub const SEED_RATE_LIMITS: &[(&str, u32, u32)] = &[
    ("google_sheets", 10, 5),
    ("google_calendar", 10, 5),
    ("slack", 1, 1),
    ("notion", 3, 3),
    ("resend", 2, 4),
    ("twilio", 1, 4),
    ("hubspot", 10, 5),
    ("zapier", 5, 5),
    ("custom_api", 1, 4),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_rate_limits_have_positive_values() {
        for (id, rps, concurrency) in SEED_RATE_LIMITS {
            assert!(!id.is_empty());
            assert!(*rps > 0, "{id} has zero rps");
            assert!(*concurrency > 0, "{id} has zero concurrency");
        }
    }
}
