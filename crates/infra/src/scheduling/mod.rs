//! Background workers driving the delivery pipeline

pub mod dispatch_worker;
pub mod error;
pub mod reconcile_scheduler;

pub use dispatch_worker::{DispatchWorker, DispatchWorkerConfig};
pub use error::{SchedulerError, SchedulerResult};
pub use reconcile_scheduler::{ReconcileScheduler, ReconcileSchedulerConfig};
