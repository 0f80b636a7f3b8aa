//! Background worker driving periodic dispatch.

use std::sync::Arc;
use std::time::Duration;

use courier_core::Dispatcher;
use courier_domain::constants::{DEFAULT_DISPATCH_BATCH_SIZE, DEFAULT_DISPATCH_INTERVAL_SECS};
use courier_domain::DispatchConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the dispatch worker
#[derive(Debug, Clone)]
pub struct DispatchWorkerConfig {
    /// Interval between dispatch cycles
    pub interval: Duration,
    /// Maximum items fetched per destination per cycle
    pub batch_size: usize,
}

impl Default for DispatchWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_DISPATCH_INTERVAL_SECS),
            batch_size: DEFAULT_DISPATCH_BATCH_SIZE,
        }
    }
}

impl From<&DispatchConfig> for DispatchWorkerConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_seconds),
            batch_size: config.batch_size,
        }
    }
}

/// Worker that runs the dispatcher on a fixed interval until cancelled.
pub struct DispatchWorker {
    dispatcher: Arc<Dispatcher>,
    config: DispatchWorkerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl DispatchWorker {
    pub fn new(dispatcher: Arc<Dispatcher>, config: DispatchWorkerConfig) -> Self {
        Self {
            dispatcher,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is already running.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!(interval_secs = self.config.interval.as_secs(), "Starting dispatch worker");

        // Fresh token so the worker can restart after a stop.
        self.cancellation_token = CancellationToken::new();

        let dispatcher = Arc::clone(&self.dispatcher);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::dispatch_loop(dispatcher, config, cancel).await;
        });
        *self.task_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Stop the worker gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is not running or fails to join.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping dispatch worker");
        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = Duration::from_secs(5);
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!("Dispatch worker stopped");
        Ok(())
    }

    /// A worker is running if it has an unfinished task handle.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn dispatch_loop(
        dispatcher: Arc<Dispatcher>,
        config: DispatchWorkerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Dispatch loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    match dispatcher.dispatch(config.batch_size).await {
                        Ok(summary) if summary.processed > 0 => {
                            info!(
                                processed = summary.processed,
                                sent = summary.sent,
                                failed = summary.failed,
                                dead_lettered = summary.dead_lettered,
                                deferred = summary.deferred,
                                "Dispatch cycle completed"
                            );
                        }
                        Ok(_) => debug!("Dispatch cycle found nothing due"),
                        Err(e) => error!(error = %e, "Dispatch cycle failed"),
                    }
                }
            }
        }
    }
}

/// Ensure the worker is cancelled when dropped
impl Drop for DispatchWorker {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() {
            self.cancellation_token.cancel();
        }
    }
}
