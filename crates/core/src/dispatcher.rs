//! Outbox dispatcher
//!
//! One `dispatch` call drains due items per enabled destination: admit
//! through the destination limiter, claim optimistically, deliver through
//! the adapter, and route the outcome (sent, retry with backoff, dead
//! letter). Claims use a version CAS so concurrent dispatchers never double
//! deliver; losing a claim is a non-event.

use std::sync::Arc;

use courier_domain::{CourierError, DestinationConfig, DispatchSummary, OutboxItem, Result};
use serde_json::Value;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

use crate::backoff::BackoffPolicy;
use crate::clock::{Clock, SystemClock};
use crate::ports::{ClaimOutcome, DestinationRepository, OutboxStore};
use crate::provider::{AdapterRegistry, DeliveryOutcome, ProviderAdapter};
use crate::rate_limit::{DestinationLimiter, LimiterRegistry};

/// How one claimed item ended up.
enum AttemptResult {
    Sent,
    Retried,
    DeadLettered,
}

/// Batch delivery engine over the outbox.
pub struct Dispatcher<C: Clock + Clone = SystemClock> {
    store: Arc<dyn OutboxStore>,
    destinations: Arc<dyn DestinationRepository>,
    adapters: Arc<AdapterRegistry>,
    limiters: LimiterRegistry<C>,
    policy: BackoffPolicy,
    clock: C,
}

impl Dispatcher<SystemClock> {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        destinations: Arc<dyn DestinationRepository>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        Self::with_clock(store, destinations, adapters, SystemClock)
    }
}

impl<C: Clock + Clone> Dispatcher<C> {
    pub fn with_clock(
        store: Arc<dyn OutboxStore>,
        destinations: Arc<dyn DestinationRepository>,
        adapters: Arc<AdapterRegistry>,
        clock: C,
    ) -> Self {
        Self {
            store,
            destinations,
            adapters,
            limiters: LimiterRegistry::with_clock(clock.clone()),
            policy: BackoffPolicy::default(),
            clock,
        }
    }

    /// Run one dispatch cycle across all enabled destinations.
    ///
    /// `batch_size` bounds the number of due items considered per
    /// destination.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, batch_size: usize) -> Result<DispatchSummary> {
        let mut summary = DispatchSummary::default();

        for destination in self.destinations.list_enabled().await? {
            let Some(adapter) = self.adapters.get(&destination.destination_id) else {
                warn!(
                    destination_id = %destination.destination_id,
                    "No adapter registered for enabled destination; skipping"
                );
                continue;
            };
            summary.merge(self.dispatch_destination(&destination, adapter, batch_size).await?);
        }

        debug!(
            processed = summary.processed,
            sent = summary.sent,
            failed = summary.failed,
            dead_lettered = summary.dead_lettered,
            deferred = summary.deferred,
            "Dispatch cycle completed"
        );
        Ok(summary)
    }

    async fn dispatch_destination(
        &self,
        destination: &DestinationConfig,
        adapter: Arc<dyn ProviderAdapter>,
        batch_size: usize,
    ) -> Result<DispatchSummary> {
        let now = self.clock.epoch_secs();
        let items =
            self.store.fetch_due(&destination.destination_id, now, batch_size).await?;
        if items.is_empty() {
            return Ok(DispatchSummary::default());
        }

        let limiter = self.limiters.limiter(destination);
        let mut summary = DispatchSummary::default();
        let mut tasks: JoinSet<Result<AttemptResult>> = JoinSet::new();
        let mut deferred = 0_u32;

        for item in items {
            let Some(permit) = limiter.try_acquire() else {
                // Out of rate budget or concurrency slots. Push the item's
                // due time forward one rate window per queue position so the
                // backlog drains at the configured rate instead of stampeding
                // on the next poll. No attempt is consumed.
                deferred += 1;
                let wait = i64::from(deferred.div_ceil(limiter.rps().max(1)));
                self.store.defer(&item.id, now + wait, now).await?;
                summary.deferred += 1;
                continue;
            };

            match self.store.claim(&item.id, item.version, now).await? {
                ClaimOutcome::Lost => {
                    debug!(item_id = %item.id, "Lost claim race; skipping item");
                    drop(permit);
                }
                ClaimOutcome::Claimed => {
                    summary.processed += 1;
                    let store = Arc::clone(&self.store);
                    let adapter = Arc::clone(&adapter);
                    let policy = self.policy;
                    let clock = self.clock.clone();
                    tasks.spawn(async move {
                        deliver_one(store, adapter, item, policy, &clock, permit).await
                    });
                }
            }
        }

        let mut first_error: Option<CourierError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(AttemptResult::Sent)) => summary.sent += 1,
                Ok(Ok(AttemptResult::Retried)) => summary.failed += 1,
                Ok(Ok(AttemptResult::DeadLettered)) => summary.dead_lettered += 1,
                Ok(Err(err)) => {
                    error!(error = %err, "Delivery task failed to persist its outcome");
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    error!(error = %join_err, "Delivery task panicked");
                    first_error
                        .get_or_insert(CourierError::Internal(format!(
                            "delivery task panicked: {join_err}"
                        )));
                }
            }
        }

        // Items whose task failed to persist stay in_flight; the reconciler
        // requeues them once they cross the stuck threshold.
        match first_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }
}

/// Deliver one claimed item and persist the outcome.
///
/// The concurrency permit is held across the adapter call and released
/// before the bookkeeping writes.
async fn deliver_one<C: Clock>(
    store: Arc<dyn OutboxStore>,
    adapter: Arc<dyn ProviderAdapter>,
    item: OutboxItem,
    policy: BackoffPolicy,
    clock: &C,
    permit: OwnedSemaphorePermit,
) -> Result<AttemptResult> {
    let attempt = item.attempt_count + 1;

    let payload: Value = match serde_json::from_str(&item.payload_json) {
        Ok(value) => value,
        Err(err) => {
            drop(permit);
            let now = clock.epoch_secs();
            let reason = truncate_reason(&format!("invalid payload JSON: {err}"));
            warn!(item_id = %item.id, error = %reason, "Dead-lettering unparseable payload");
            store.mark_dead_letter(&item.id, attempt, &reason, now).await?;
            return Ok(AttemptResult::DeadLettered);
        }
    };

    let outcome = adapter.deliver(&item.operation, &payload).await;
    drop(permit);
    let now = clock.epoch_secs();

    match outcome {
        DeliveryOutcome::Success { response } => {
            store.mark_sent(&item.id, Some(&response.to_string()), now).await?;
            debug!(item_id = %item.id, attempt, "Delivered outbox item");
            Ok(AttemptResult::Sent)
        }
        DeliveryOutcome::Permanent { reason } => {
            let reason = truncate_reason(&reason);
            warn!(item_id = %item.id, attempt, error = %reason, "Permanent failure; dead-lettering");
            store.mark_dead_letter(&item.id, attempt, &reason, now).await?;
            Ok(AttemptResult::DeadLettered)
        }
        DeliveryOutcome::Transient { reason } => {
            let reason = truncate_reason(&reason);
            if attempt >= item.max_attempts {
                warn!(item_id = %item.id, attempt, error = %reason, "Attempts exhausted; dead-lettering");
                store
                    .mark_dead_letter(
                        &item.id,
                        attempt,
                        &format!("attempts exhausted: {reason}"),
                        now,
                    )
                    .await?;
                return Ok(AttemptResult::DeadLettered);
            }
            let delay = policy.transient_delay(attempt);
            let next_attempt_at = now.saturating_add(delay_secs(delay));
            debug!(
                item_id = %item.id,
                attempt,
                next_attempt_at,
                error = %reason,
                "Transient failure; scheduling retry"
            );
            store.schedule_retry(&item.id, attempt, next_attempt_at, &reason, now).await?;
            Ok(AttemptResult::Retried)
        }
        DeliveryOutcome::RateLimited { retry_after } => {
            if attempt >= item.max_attempts {
                warn!(item_id = %item.id, attempt, "Attempts exhausted while rate limited; dead-lettering");
                store
                    .mark_dead_letter(
                        &item.id,
                        attempt,
                        "attempts exhausted: provider rate limited",
                        now,
                    )
                    .await?;
                return Ok(AttemptResult::DeadLettered);
            }
            let delay = policy.rate_limit_delay(retry_after);
            let next_attempt_at = now.saturating_add(delay_secs(delay));
            debug!(
                item_id = %item.id,
                attempt,
                next_attempt_at,
                "Provider rate limited; scheduling retry"
            );
            store
                .schedule_retry(&item.id, attempt, next_attempt_at, "provider rate limited", now)
                .await?;
            Ok(AttemptResult::Retried)
        }
    }
}

fn delay_secs(delay: std::time::Duration) -> i64 {
    i64::try_from(delay.as_secs().max(1)).unwrap_or(i64::MAX)
}

fn truncate_reason(reason: &str) -> String {
    const MAX_LEN: usize = 256;
    if reason.len() <= MAX_LEN {
        return reason.to_string();
    }

    let mut truncated = reason.chars().take(MAX_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}
