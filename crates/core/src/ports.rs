//! Repository ports implemented by the storage layer
//!
//! `courier-infra` provides the SQLite-backed implementations; tests swap in
//! in-memory mocks. All timestamps are epoch seconds supplied by the caller
//! so services stay deterministic under a mock clock.

use async_trait::async_trait;
use courier_domain::{DestinationConfig, OutboxItem, OutboxStats, ReconcileRun, Result};

/// Result of an optimistic claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The item transitioned to `in_flight` under this caller's version.
    Claimed,
    /// Another dispatcher claimed the item first, or it left `queued`.
    Lost,
}

/// Durable outbox storage.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert a new item.
    ///
    /// Returns `false` without writing when an item with the same
    /// idempotency key already exists; the unique index is the arbiter, so
    /// concurrent duplicate enqueues race safely.
    async fn insert(&self, item: &OutboxItem) -> Result<bool>;

    /// Look up an item by its idempotency key.
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OutboxItem>>;

    /// Fetch queued items due at `now` for one destination, oldest first.
    async fn fetch_due(
        &self,
        destination_id: &str,
        now: i64,
        limit: usize,
    ) -> Result<Vec<OutboxItem>>;

    /// Atomically claim a queued item for delivery.
    ///
    /// Succeeds only if the item is still `queued` at exactly `version`;
    /// bumps the version and moves the item to `in_flight`.
    async fn claim(&self, id: &str, version: i64, now: i64) -> Result<ClaimOutcome>;

    /// Push a queued item's `next_attempt_at` forward without consuming an
    /// attempt. Used when the rate limiter defers an item.
    async fn defer(&self, id: &str, next_attempt_at: i64, now: i64) -> Result<()>;

    /// Mark an in-flight item as delivered.
    async fn mark_sent(
        &self,
        id: &str,
        provider_response_json: Option<&str>,
        now: i64,
    ) -> Result<()>;

    /// Return an in-flight item to `queued` with a future `next_attempt_at`.
    async fn schedule_retry(
        &self,
        id: &str,
        attempt_count: i32,
        next_attempt_at: i64,
        error: &str,
        now: i64,
    ) -> Result<()>;

    /// Move an in-flight item to `dead_letter`.
    async fn mark_dead_letter(
        &self,
        id: &str,
        attempt_count: i32,
        error: &str,
        now: i64,
    ) -> Result<()>;

    /// Force stranded items back into dispatch.
    ///
    /// Covers `in_flight` rows untouched since `stuck_before` (crashed
    /// dispatcher) and `queued` rows created before it (silently skipped),
    /// resetting `next_attempt_at` to `now` without consuming an attempt.
    /// Returns the number of items affected. `limit` caps the sweep so a
    /// reconciliation run stays bounded.
    async fn requeue_stuck(
        &self,
        destination_id: &str,
        stuck_before: i64,
        now: i64,
        limit: usize,
    ) -> Result<u32>;

    /// Most recently updated `sent` items for a destination, used by drift
    /// probes.
    async fn recently_sent(&self, destination_id: &str, limit: usize)
        -> Result<Vec<OutboxItem>>;

    /// Aggregate counts, optionally scoped to one destination.
    async fn stats(&self, destination_id: Option<&str>, now: i64) -> Result<OutboxStats>;
}

/// Destination configuration storage.
#[async_trait]
pub trait DestinationRepository: Send + Sync {
    /// Look up one destination.
    async fn get(&self, destination_id: &str) -> Result<Option<DestinationConfig>>;

    /// All destinations currently enabled for dispatch.
    async fn list_enabled(&self) -> Result<Vec<DestinationConfig>>;

    /// Create or replace a destination's configuration.
    async fn upsert(&self, config: &DestinationConfig) -> Result<()>;
}

/// Append-only audit log of reconciliation sweeps.
#[async_trait]
pub trait ReconcileRunRepository: Send + Sync {
    /// Record a finished run.
    async fn record(&self, run: &ReconcileRun) -> Result<()>;

    /// Most recent run for a destination, if any.
    async fn last_run(&self, destination_id: &str) -> Result<Option<ReconcileRun>>;
}

/// TTL-based mutual exclusion for reconciliation.
///
/// A lock that outlives its TTL is considered abandoned and may be taken
/// over, so a crashed run never blocks reconciliation forever.
#[async_trait]
pub trait ReconcileLock: Send + Sync {
    /// Try to take the lock for `destination_id`.
    ///
    /// Returns `true` when acquired (including takeover of an expired
    /// lock), `false` when another holder's unexpired lock is in place.
    async fn try_acquire(
        &self,
        destination_id: &str,
        holder: &str,
        ttl_secs: i64,
        now: i64,
    ) -> Result<bool>;

    /// Release the lock if `holder` still owns it.
    async fn release(&self, destination_id: &str, holder: &str) -> Result<()>;
}
