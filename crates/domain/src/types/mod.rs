//! Domain types and models

pub mod destination;
pub mod outbox;
pub mod reconcile;

pub use destination::{DestinationConfig, RateLimit};
pub use outbox::{DispatchSummary, OutboxItem, OutboxItemRef, OutboxStats, OutboxStatus};
pub use reconcile::{ReconcileRun, ReconcileRunStatus};
