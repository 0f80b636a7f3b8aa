//! Read-only status queries
//!
//! Polled by dashboards and health checks. Never mutates the outbox.

use std::sync::Arc;

use courier_domain::{OutboxStats, ReconcileRun, Result};

use crate::clock::{Clock, SystemClock};
use crate::ports::{OutboxStore, ReconcileRunRepository};

/// Query surface over outbox counts and reconciliation history.
pub struct StatusQuery<C: Clock = SystemClock> {
    store: Arc<dyn OutboxStore>,
    runs: Arc<dyn ReconcileRunRepository>,
    clock: C,
}

impl StatusQuery<SystemClock> {
    pub fn new(store: Arc<dyn OutboxStore>, runs: Arc<dyn ReconcileRunRepository>) -> Self {
        Self::with_clock(store, runs, SystemClock)
    }
}

impl<C: Clock> StatusQuery<C> {
    pub fn with_clock(
        store: Arc<dyn OutboxStore>,
        runs: Arc<dyn ReconcileRunRepository>,
        clock: C,
    ) -> Self {
        Self { store, runs, clock }
    }

    /// Aggregate counts across the whole outbox.
    pub async fn overall(&self) -> Result<OutboxStats> {
        self.store.stats(None, self.clock.epoch_secs()).await
    }

    /// Aggregate counts for one destination.
    pub async fn for_destination(&self, destination_id: &str) -> Result<OutboxStats> {
        self.store.stats(Some(destination_id), self.clock.epoch_secs()).await
    }

    /// The most recent reconciliation run for a destination, if any.
    pub async fn last_reconcile_run(&self, destination_id: &str) -> Result<Option<ReconcileRun>> {
        self.runs.last_run(destination_id).await
    }
}
