//! # Courier Core
//!
//! Delivery pipeline services for the Courier outbox. This crate holds the
//! pure application logic: enqueue with idempotent deduplication, the
//! dispatcher with its per-destination rate limiting, retry/backoff policy,
//! the reconciler, and the read-only status query surface.
//!
//! Storage and provider transports live behind the traits in [`ports`] and
//! [`provider`]; `courier-infra` supplies the SQLite and HTTP implementations.

pub mod backoff;
pub mod clock;
pub mod dispatcher;
pub mod enqueue;
pub mod idempotency;
pub mod ports;
pub mod provider;
pub mod rate_limit;
pub mod reconciler;
pub mod stats;

pub use backoff::BackoffPolicy;
pub use clock::{Clock, MockClock, SystemClock};
pub use dispatcher::Dispatcher;
pub use enqueue::{EnqueueRequest, EnqueueService};
pub use idempotency::{canonical_json, idempotency_key};
pub use ports::{
    ClaimOutcome, DestinationRepository, OutboxStore, ReconcileLock, ReconcileRunRepository,
};
pub use provider::{AdapterRegistry, DeliveryOutcome, ProbeOutcome, ProviderAdapter};
pub use rate_limit::{DestinationLimiter, LimiterRegistry, TokenBucket};
pub use reconciler::Reconciler;
pub use stats::StatusQuery;
