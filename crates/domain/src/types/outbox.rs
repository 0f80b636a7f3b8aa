//! Outbox model types
//!
//! These types represent the durable delivery queue and are used by the
//! repository ports in `courier-core`.

use serde::{Deserialize, Serialize};

/// A single queued delivery attempt against an external destination.
///
/// Items are created exclusively by enqueue, mutated by the dispatcher
/// (status/attempt progression) and the reconciler (forced requeue), and
/// never deleted; terminal rows stay behind as the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxItem {
    pub id: String,
    pub destination_id: String,
    pub operation: String,
    pub stable_resource_id: String,
    pub idempotency_key: String,
    pub payload_json: String,
    pub status: OutboxStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    /// Epoch seconds before which the dispatcher must not pick this item up.
    pub next_attempt_at: i64,
    /// Optimistic concurrency token, bumped on every claim.
    pub version: i64,
    pub last_error: Option<String>,
    pub provider_response_json: Option<String>,
    pub sent_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OutboxItem {
    /// Whether the item is eligible for dispatch at `now`.
    pub fn is_due(&self, now: i64) -> bool {
        self.status == OutboxStatus::Queued && self.next_attempt_at <= now
    }
}

/// Outbox item status
///
/// `Failed` is retained for operator tooling and historical rows; the
/// dispatcher itself only produces queued, in_flight, sent and dead_letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Queued,
    InFlight,
    Sent,
    Failed,
    DeadLetter,
}

crate::impl_status_conversions!(OutboxStatus {
    Queued => "queued",
    InFlight => "in_flight",
    Sent => "sent",
    Failed => "failed",
    DeadLetter => "dead_letter"
});

/// Reference returned by enqueue.
///
/// `created` is false when the call deduplicated against an existing item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboxItemRef {
    pub id: String,
    pub idempotency_key: String,
    pub created: bool,
}

/// Per-call summary returned by the dispatcher.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Items for which an adapter call was attempted.
    pub processed: u32,
    pub sent: u32,
    /// Items rescheduled for a later attempt.
    pub failed: u32,
    pub dead_lettered: u32,
    /// Items left untouched because no rate-limit token or concurrency slot
    /// was available; no attempt was consumed.
    pub deferred: u32,
}

impl DispatchSummary {
    pub fn merge(&mut self, other: DispatchSummary) {
        self.processed += other.processed;
        self.sent += other.sent;
        self.failed += other.failed;
        self.dead_lettered += other.dead_lettered;
        self.deferred += other.deferred;
    }
}

/// Read-only aggregate over the outbox, polled by dashboards.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboxStats {
    pub queued: u64,
    pub in_flight: u64,
    pub sent: u64,
    pub failed: u64,
    pub dead_letter: u64,
    /// Age in seconds of the oldest still-queued item, if any.
    pub oldest_queued_age_secs: Option<i64>,
}
