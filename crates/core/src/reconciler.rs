//! Reconciliation sweeps
//!
//! The reconciler is the safety net under the dispatcher: it forces items
//! stranded past a threshold (stuck `in_flight` after a crashed dispatcher,
//! or `queued` rows the dispatcher keeps missing) back into dispatch and
//! spot-checks recently sent items against the provider's view. Each sweep
//! runs under a TTL lock so overlapping schedules and crashed runs cannot
//! pile up, and finishes by writing an audit record.

use std::sync::Arc;
use std::time::Duration;

use courier_domain::{
    CourierError, ReconcileConfig, ReconcileRun, ReconcileRunStatus, Result,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::ports::{DestinationRepository, OutboxStore, ReconcileLock, ReconcileRunRepository};
use crate::provider::{AdapterRegistry, ProbeOutcome};

/// Upper bound on drift probes per sweep; probes are API calls against the
/// provider and must stay a light sampling, not a full audit.
const DRIFT_PROBE_LIMIT: usize = 25;

#[derive(Debug, Default, Clone, Copy)]
struct SweepCounters {
    items_examined: u32,
    items_requeued: u32,
    api_calls_made: u32,
    rate_limited_count: u32,
    success_count: u32,
    failure_count: u32,
    drift_count: u32,
}

/// Per-destination reconciliation engine.
pub struct Reconciler<C: Clock + Clone = SystemClock> {
    store: Arc<dyn OutboxStore>,
    destinations: Arc<dyn DestinationRepository>,
    adapters: Arc<AdapterRegistry>,
    runs: Arc<dyn ReconcileRunRepository>,
    lock: Arc<dyn ReconcileLock>,
    config: ReconcileConfig,
    holder_id: String,
    clock: C,
}

impl Reconciler<SystemClock> {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        destinations: Arc<dyn DestinationRepository>,
        adapters: Arc<AdapterRegistry>,
        runs: Arc<dyn ReconcileRunRepository>,
        lock: Arc<dyn ReconcileLock>,
        config: ReconcileConfig,
    ) -> Self {
        Self::with_clock(store, destinations, adapters, runs, lock, config, SystemClock)
    }
}

impl<C: Clock + Clone> Reconciler<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn with_clock(
        store: Arc<dyn OutboxStore>,
        destinations: Arc<dyn DestinationRepository>,
        adapters: Arc<AdapterRegistry>,
        runs: Arc<dyn ReconcileRunRepository>,
        lock: Arc<dyn ReconcileLock>,
        config: ReconcileConfig,
        clock: C,
    ) -> Self {
        Self {
            store,
            destinations,
            adapters,
            runs,
            lock,
            config,
            holder_id: Uuid::new_v4().to_string(),
            clock,
        }
    }

    /// Reconcile every enabled destination, skipping ones whose lock is
    /// held. One destination failing does not stop the others.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&self) -> Result<Vec<ReconcileRun>> {
        let mut runs = Vec::new();
        for destination in self.destinations.list_enabled().await? {
            match self.reconcile(&destination.destination_id).await {
                Ok(run) => runs.push(run),
                Err(err) => {
                    warn!(
                        destination_id = %destination.destination_id,
                        error = %err,
                        "Reconciliation skipped"
                    );
                }
            }
        }
        Ok(runs)
    }

    /// Run one reconciliation sweep for a destination.
    ///
    /// # Errors
    /// Returns `CourierError::Config` for unknown destinations and
    /// `CourierError::Internal` when another sweep holds the lock. Sweep
    /// failures and timeouts do not error; they are captured in the
    /// returned audit record.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, destination_id: &str) -> Result<ReconcileRun> {
        self.destinations.get(destination_id).await?.ok_or_else(|| {
            CourierError::Config(format!("unknown destination '{destination_id}'"))
        })?;

        let started_at = self.clock.epoch_secs();
        let acquired = self
            .lock
            .try_acquire(destination_id, &self.holder_id, self.config.lock_ttl_seconds, started_at)
            .await?;
        if !acquired {
            return Err(CourierError::Internal(format!(
                "reconciliation for '{destination_id}' already in progress"
            )));
        }

        let outcome = tokio::time::timeout(
            Duration::from_secs(self.config.run_timeout_seconds),
            self.sweep(destination_id),
        )
        .await;

        let finished_at = self.clock.epoch_secs();
        let (counters, status, error) = match outcome {
            Ok(Ok(counters)) => (counters, ReconcileRunStatus::Completed, None),
            Ok(Err(err)) => {
                warn!(destination_id, error = %err, "Reconciliation sweep failed");
                (SweepCounters::default(), ReconcileRunStatus::Failed, Some(err.to_string()))
            }
            Err(_) => {
                warn!(
                    destination_id,
                    timeout_secs = self.config.run_timeout_seconds,
                    "Reconciliation sweep timed out"
                );
                (
                    SweepCounters::default(),
                    ReconcileRunStatus::TimedOut,
                    Some(format!(
                        "sweep exceeded {}s timeout",
                        self.config.run_timeout_seconds
                    )),
                )
            }
        };

        let run = ReconcileRun {
            id: Uuid::new_v4().to_string(),
            destination_id: destination_id.to_string(),
            started_at,
            finished_at: Some(finished_at),
            items_examined: counters.items_examined,
            items_requeued: counters.items_requeued,
            api_calls_made: counters.api_calls_made,
            rate_limited_count: counters.rate_limited_count,
            success_count: counters.success_count,
            failure_count: counters.failure_count,
            drift_count: counters.drift_count,
            status,
            error,
        };

        let record_result = self.runs.record(&run).await;
        if let Err(err) = self.lock.release(destination_id, &self.holder_id).await {
            warn!(destination_id, error = %err, "Failed to release reconcile lock");
        }
        record_result?;

        info!(
            destination_id,
            status = %run.status,
            items_requeued = run.items_requeued,
            drift_count = run.drift_count,
            "Reconciliation run recorded"
        );
        Ok(run)
    }

    async fn sweep(&self, destination_id: &str) -> Result<SweepCounters> {
        let mut counters = SweepCounters::default();
        let now = self.clock.epoch_secs();

        let stuck_before = now.saturating_sub(self.config.stuck_threshold_seconds);
        let requeued = self
            .store
            .requeue_stuck(destination_id, stuck_before, now, self.config.max_items_per_run)
            .await?;
        if requeued > 0 {
            info!(destination_id, requeued, "Requeued stranded items");
        }
        counters.items_requeued = requeued;
        counters.items_examined = requeued;

        let Some(adapter) = self.adapters.get(destination_id) else {
            return Ok(counters);
        };

        let probe_budget = self
            .config
            .max_items_per_run
            .saturating_sub(requeued as usize)
            .min(DRIFT_PROBE_LIMIT);
        let recent = self.store.recently_sent(destination_id, probe_budget).await?;

        for item in recent {
            match adapter.probe(&item.stable_resource_id).await {
                ProbeOutcome::Unsupported => break,
                ProbeOutcome::Confirmed => {
                    counters.items_examined += 1;
                    counters.api_calls_made += 1;
                    counters.success_count += 1;
                }
                ProbeOutcome::Drift { detail } => {
                    counters.items_examined += 1;
                    counters.api_calls_made += 1;
                    counters.drift_count += 1;
                    warn!(
                        destination_id,
                        item_id = %item.id,
                        stable_resource_id = %item.stable_resource_id,
                        detail = %detail,
                        "Drift detected between local record and provider state"
                    );
                }
                ProbeOutcome::RateLimited => {
                    counters.api_calls_made += 1;
                    counters.rate_limited_count += 1;
                    break;
                }
            }
        }

        Ok(counters)
    }
}
