//! Background scheduler driving periodic reconciliation.

use std::sync::Arc;
use std::time::Duration;

use courier_core::Reconciler;
use courier_domain::constants::DEFAULT_RECONCILE_INTERVAL_SECS;
use courier_domain::ReconcileConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the reconcile scheduler
#[derive(Debug, Clone)]
pub struct ReconcileSchedulerConfig {
    /// Interval between reconciliation sweeps
    pub interval: Duration,
}

impl Default for ReconcileSchedulerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS) }
    }
}

impl From<&ReconcileConfig> for ReconcileSchedulerConfig {
    fn from(config: &ReconcileConfig) -> Self {
        Self { interval: Duration::from_secs(config.interval_seconds) }
    }
}

/// Scheduler that reconciles every enabled destination on a fixed interval.
pub struct ReconcileScheduler {
    reconciler: Arc<Reconciler>,
    config: ReconcileSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl ReconcileScheduler {
    pub fn new(reconciler: Arc<Reconciler>, config: ReconcileSchedulerConfig) -> Self {
        Self {
            reconciler,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler is already running.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(interval_secs = self.config.interval.as_secs(), "Starting reconcile scheduler");

        self.cancellation_token = CancellationToken::new();

        let reconciler = Arc::clone(&self.reconciler);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::reconcile_loop(reconciler, config, cancel).await;
        });
        *self.task_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Stop the scheduler gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler is not running or fails to join.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping reconcile scheduler");
        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = Duration::from_secs(5);
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!("Reconcile scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn reconcile_loop(
        reconciler: Arc<Reconciler>,
        config: ReconcileSchedulerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Reconcile loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    match reconciler.reconcile_all().await {
                        Ok(runs) => {
                            let requeued: u32 = runs.iter().map(|r| r.items_requeued).sum();
                            let drift: u32 = runs.iter().map(|r| r.drift_count).sum();
                            info!(
                                destinations = runs.len(),
                                items_requeued = requeued,
                                drift_count = drift,
                                "Reconciliation sweep completed"
                            );
                        }
                        Err(e) => error!(error = %e, "Reconciliation sweep failed"),
                    }
                }
            }
        }
    }
}

/// Ensure the scheduler is cancelled when dropped
impl Drop for ReconcileScheduler {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() {
            self.cancellation_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use courier_core::AdapterRegistry;
    use tempfile::TempDir;

    use super::*;
    use crate::database::{
        DbManager, SqliteDestinationRepository, SqliteOutboxRepository, SqliteReconcileLock,
        SqliteReconcileRunRepository,
    };

    fn build_scheduler(temp_dir: &TempDir) -> ReconcileScheduler {
        let manager = Arc::new(
            DbManager::new(temp_dir.path().join("test.db"), 2).expect("manager created"),
        );
        manager.run_migrations().expect("migrations run");

        let reconciler = Reconciler::new(
            Arc::new(SqliteOutboxRepository::new(Arc::clone(&manager))),
            Arc::new(SqliteDestinationRepository::new(Arc::clone(&manager))),
            Arc::new(AdapterRegistry::new()),
            Arc::new(SqliteReconcileRunRepository::new(Arc::clone(&manager))),
            Arc::new(SqliteReconcileLock::new(manager)),
            ReconcileConfig::default(),
        );
        ReconcileScheduler::new(
            Arc::new(reconciler),
            ReconcileSchedulerConfig { interval: Duration::from_millis(10) },
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduler_lifecycle() {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut scheduler = build_scheduler(&temp_dir);

        assert!(!scheduler.is_running());
        scheduler.start().await.expect("start");
        assert!(scheduler.is_running());
        scheduler.stop().await.expect("stop");
        assert!(!scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_start_fails() {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut scheduler = build_scheduler(&temp_dir);

        scheduler.start().await.expect("start");
        assert!(matches!(scheduler.start().await, Err(SchedulerError::AlreadyRunning)));
        scheduler.stop().await.expect("stop");
    }
}
