//! Reconciliation audit types

use serde::{Deserialize, Serialize};

/// Append-only record of one reconciliation sweep for a destination.
///
/// Created and finalized entirely by a single reconciler invocation; never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileRun {
    pub id: String,
    pub destination_id: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub items_examined: u32,
    pub items_requeued: u32,
    pub api_calls_made: u32,
    pub rate_limited_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    /// Deliveries whose local status disagreed with the provider's view.
    pub drift_count: u32,
    pub status: ReconcileRunStatus,
    pub error: Option<String>,
}

/// Terminal status of a reconciliation sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileRunStatus {
    Completed,
    Failed,
    TimedOut,
}

crate::impl_status_conversions!(ReconcileRunStatus {
    Completed => "completed",
    Failed => "failed",
    TimedOut => "timed_out"
});
