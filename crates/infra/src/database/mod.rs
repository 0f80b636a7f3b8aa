//! SQLite persistence layer

pub mod destination_repository;
pub mod manager;
pub mod outbox_repository;
pub mod reconcile_repository;

pub use destination_repository::SqliteDestinationRepository;
pub use manager::{DbConnection, DbManager};
pub use outbox_repository::SqliteOutboxRepository;
pub use reconcile_repository::{SqliteReconcileLock, SqliteReconcileRunRepository};
