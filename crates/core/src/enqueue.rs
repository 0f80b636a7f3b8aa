//! Idempotent enqueue
//!
//! The only write path into the outbox. Derives the idempotency key, checks
//! for an existing item, and inserts a fresh `queued` item that is due
//! immediately. Duplicate calls return the existing item's reference with
//! `created = false` and never touch its state.

use std::sync::Arc;

use courier_domain::constants::DEFAULT_MAX_ATTEMPTS;
use courier_domain::{CourierError, OutboxItem, OutboxItemRef, OutboxStatus, Result};
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::idempotency::idempotency_key;
use crate::ports::{DestinationRepository, OutboxStore};

/// One logical change to deliver.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub destination_id: String,
    pub operation: String,
    /// Caller-stable identifier of the underlying resource (lead id,
    /// document id, ...); feeds the idempotency key and drift probes.
    pub stable_resource_id: String,
    pub payload: Value,
}

/// Write-side service for the outbox.
pub struct EnqueueService<C: Clock = SystemClock> {
    store: Arc<dyn OutboxStore>,
    destinations: Arc<dyn DestinationRepository>,
    clock: C,
    max_attempts: i32,
}

impl EnqueueService<SystemClock> {
    pub fn new(store: Arc<dyn OutboxStore>, destinations: Arc<dyn DestinationRepository>) -> Self {
        Self::with_clock(store, destinations, SystemClock)
    }
}

impl<C: Clock> EnqueueService<C> {
    pub fn with_clock(
        store: Arc<dyn OutboxStore>,
        destinations: Arc<dyn DestinationRepository>,
        clock: C,
    ) -> Self {
        Self { store, destinations, clock, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }

    /// Enqueue a delivery, deduplicating on the idempotency key.
    ///
    /// # Errors
    /// Returns `CourierError::Config` for unknown or disabled destinations
    /// and `CourierError::InvalidInput` for empty request fields.
    #[instrument(skip(self, request), fields(destination_id = %request.destination_id, operation = %request.operation))]
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<OutboxItemRef> {
        self.validate(&request)?;

        let destination = self
            .destinations
            .get(&request.destination_id)
            .await?
            .ok_or_else(|| {
                CourierError::Config(format!("unknown destination '{}'", request.destination_id))
            })?;
        if !destination.enabled {
            return Err(CourierError::Config(format!(
                "destination '{}' is disabled",
                request.destination_id
            )));
        }

        let key = idempotency_key(
            &request.destination_id,
            &request.operation,
            &request.stable_resource_id,
            &request.payload,
        );

        if let Some(existing) = self.store.find_by_idempotency_key(&key).await? {
            debug!(item_id = %existing.id, "Enqueue deduplicated against existing item");
            return Ok(OutboxItemRef { id: existing.id, idempotency_key: key, created: false });
        }

        let now = self.clock.epoch_secs();
        let item = OutboxItem {
            id: Uuid::new_v4().to_string(),
            destination_id: request.destination_id,
            operation: request.operation,
            stable_resource_id: request.stable_resource_id,
            idempotency_key: key.clone(),
            payload_json: request.payload.to_string(),
            status: OutboxStatus::Queued,
            attempt_count: 0,
            max_attempts: self.max_attempts,
            next_attempt_at: now,
            version: 1,
            last_error: None,
            provider_response_json: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        };

        if self.store.insert(&item).await? {
            debug!(item_id = %item.id, "Enqueued new outbox item");
            return Ok(OutboxItemRef { id: item.id, idempotency_key: key, created: true });
        }

        // Lost an insert race against a concurrent duplicate; surface the
        // winner's item.
        match self.store.find_by_idempotency_key(&key).await? {
            Some(existing) => {
                Ok(OutboxItemRef { id: existing.id, idempotency_key: key, created: false })
            }
            None => Err(CourierError::Internal(
                "duplicate idempotency key reported but no item found".into(),
            )),
        }
    }

    fn validate(&self, request: &EnqueueRequest) -> Result<()> {
        if request.destination_id.trim().is_empty() {
            return Err(CourierError::InvalidInput("destination_id must not be empty".into()));
        }
        if request.operation.trim().is_empty() {
            return Err(CourierError::InvalidInput("operation must not be empty".into()));
        }
        if request.stable_resource_id.trim().is_empty() {
            return Err(CourierError::InvalidInput(
                "stable_resource_id must not be empty".into(),
            ));
        }
        Ok(())
    }
}
