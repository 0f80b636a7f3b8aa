//! # Courier Infrastructure
//!
//! Infrastructure implementations of the core delivery pipeline ports.
//!
//! This crate contains:
//! - SQLite-backed repositories (outbox, destinations, reconciliation)
//! - HTTP provider adapters (webhook, email, SMS)
//! - Background workers for dispatch and reconciliation
//! - Configuration loading (environment variables and config files)
//!
//! ## Architecture
//! - Implements traits defined in `courier-core`
//! - Contains all "impure" code (I/O, HTTP, clock-driven loops)

pub mod adapters;
pub mod config;
pub mod database;
pub mod errors;
pub mod scheduling;

pub use adapters::{EmailAdapter, SmsAdapter, WebhookAdapter};
pub use database::{
    DbManager, SqliteDestinationRepository, SqliteOutboxRepository, SqliteReconcileLock,
    SqliteReconcileRunRepository,
};
pub use errors::InfraError;
pub use scheduling::{
    DispatchWorker, DispatchWorkerConfig, ReconcileScheduler, ReconcileSchedulerConfig,
    SchedulerError, SchedulerResult,
};
