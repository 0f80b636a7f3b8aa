//! End-to-end pipeline tests over real SQLite and a mock HTTP provider.

use std::sync::Arc;

use courier_core::{
    AdapterRegistry, ClaimOutcome, Clock, DestinationRepository, Dispatcher, EnqueueRequest,
    EnqueueService, MockClock, OutboxStore, ReconcileLock, ReconcileRunRepository, Reconciler,
    StatusQuery,
};
use courier_domain::{DestinationConfig, OutboxStatus, RateLimit, ReconcileConfig};
use courier_infra::adapters::webhook::WebhookSettings;
use courier_infra::{
    DbManager, SqliteDestinationRepository, SqliteOutboxRepository, SqliteReconcileLock,
    SqliteReconcileRunRepository, WebhookAdapter,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    _temp_dir: TempDir,
    store: Arc<SqliteOutboxRepository>,
    destinations: Arc<SqliteDestinationRepository>,
    runs: Arc<SqliteReconcileRunRepository>,
    lock: Arc<SqliteReconcileLock>,
    clock: MockClock,
}

impl Harness {
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let manager = Arc::new(
            DbManager::new(temp_dir.path().join("courier.db"), 4).expect("manager created"),
        );
        manager.run_migrations().expect("migrations run");

        Self {
            _temp_dir: temp_dir,
            store: Arc::new(SqliteOutboxRepository::new(Arc::clone(&manager))),
            destinations: Arc::new(SqliteDestinationRepository::new(Arc::clone(&manager))),
            runs: Arc::new(SqliteReconcileRunRepository::new(Arc::clone(&manager))),
            lock: Arc::new(SqliteReconcileLock::new(manager)),
            clock: MockClock::new(),
        }
    }

    async fn add_destination(&self, id: &str, rate_limit: RateLimit, server: &MockServer) {
        let settings = serde_json::json!({"url": format!("{}/hook", server.uri())});
        self.destinations
            .upsert(&DestinationConfig {
                destination_id: id.to_string(),
                enabled: true,
                rate_limit,
                settings_json: settings.to_string(),
            })
            .await
            .expect("destination upserted");
    }

    fn adapters_for(&self, id: &str, server: &MockServer) -> Arc<AdapterRegistry> {
        let adapter = WebhookAdapter::new(WebhookSettings {
            url: format!("{}/hook", server.uri()),
            auth_token: None,
            probe_url: None,
        })
        .expect("adapter built");

        let mut registry = AdapterRegistry::new();
        registry.register(id, Arc::new(adapter));
        Arc::new(registry)
    }

    fn enqueue_service(&self) -> EnqueueService<MockClock> {
        EnqueueService::with_clock(
            Arc::clone(&self.store) as Arc<dyn OutboxStore>,
            Arc::clone(&self.destinations) as Arc<dyn DestinationRepository>,
            self.clock.clone(),
        )
    }

    fn dispatcher(&self, adapters: Arc<AdapterRegistry>) -> Dispatcher<MockClock> {
        Dispatcher::with_clock(
            Arc::clone(&self.store) as Arc<dyn OutboxStore>,
            Arc::clone(&self.destinations) as Arc<dyn DestinationRepository>,
            adapters,
            self.clock.clone(),
        )
    }

    fn reconciler(&self, adapters: Arc<AdapterRegistry>) -> Reconciler<MockClock> {
        Reconciler::with_clock(
            Arc::clone(&self.store) as Arc<dyn OutboxStore>,
            Arc::clone(&self.destinations) as Arc<dyn DestinationRepository>,
            adapters,
            Arc::clone(&self.runs) as Arc<dyn ReconcileRunRepository>,
            Arc::clone(&self.lock) as Arc<dyn ReconcileLock>,
            ReconcileConfig::default(),
            self.clock.clone(),
        )
    }
}

fn request(destination: &str, resource: &str) -> EnqueueRequest {
    EnqueueRequest {
        destination_id: destination.to_string(),
        operation: "create_row".to_string(),
        stable_resource_id: resource.to_string(),
        payload: serde_json::json!({"name": "Ada", "email": "ada@example.test"}),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn enqueue_dispatch_marks_item_sent() {
    let harness = Harness::new().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"row": 7})))
        .expect(1)
        .mount(&server)
        .await;

    harness.add_destination("hooks", RateLimit { rps: 5, max_concurrency: 5 }, &server).await;

    let enqueue = harness.enqueue_service();
    let item_ref = enqueue.enqueue(request("hooks", "lead-1")).await.expect("enqueued");
    assert!(item_ref.created);

    // Same logical request is deduplicated, not re-queued.
    let duplicate = enqueue.enqueue(request("hooks", "lead-1")).await.expect("enqueued");
    assert!(!duplicate.created);
    assert_eq!(duplicate.id, item_ref.id);

    let dispatcher = harness.dispatcher(harness.adapters_for("hooks", &server));
    let summary = dispatcher.dispatch(50).await.expect("dispatched");
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.sent, 1);

    let item = harness
        .store
        .find_by_idempotency_key(&item_ref.idempotency_key)
        .await
        .expect("lookup")
        .expect("item exists");
    assert_eq!(item.status, OutboxStatus::Sent);
    assert!(item.provider_response_json.as_deref().unwrap().contains("row"));

    let status = StatusQuery::with_clock(
        Arc::clone(&harness.store) as Arc<dyn OutboxStore>,
        Arc::clone(&harness.runs) as Arc<dyn ReconcileRunRepository>,
        harness.clock.clone(),
    );
    let stats = status.overall().await.expect("stats");
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.queued, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failure_retries_after_backoff() {
    let harness = Harness::new().await;
    let server = MockServer::start().await;
    // First call fails with a 503; every later call succeeds.
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    harness.add_destination("hooks", RateLimit { rps: 5, max_concurrency: 5 }, &server).await;
    let enqueue = harness.enqueue_service();
    let item_ref = enqueue.enqueue(request("hooks", "lead-1")).await.expect("enqueued");

    let dispatcher = harness.dispatcher(harness.adapters_for("hooks", &server));
    let summary = dispatcher.dispatch(50).await.expect("dispatched");
    assert_eq!(summary.failed, 1);

    let item = harness
        .store
        .find_by_idempotency_key(&item_ref.idempotency_key)
        .await
        .expect("lookup")
        .expect("item exists");
    assert_eq!(item.status, OutboxStatus::Queued);
    assert_eq!(item.attempt_count, 1);
    let now = harness.clock.epoch_secs();
    // First retry waits 5s * 2^1 scaled by jitter in [1.0, 1.3).
    assert!(item.next_attempt_at >= now + 10 && item.next_attempt_at <= now + 13);

    // Not yet due: nothing happens.
    let summary = dispatcher.dispatch(50).await.expect("dispatched");
    assert_eq!(summary.processed, 0);

    // Past the top of the jitter window the retry is due.
    harness.clock.advance_secs(13);
    let summary = dispatcher.dispatch(50).await.expect("dispatched");
    assert_eq!(summary.sent, 1);

    let item = harness
        .store
        .find_by_idempotency_key(&item_ref.idempotency_key)
        .await
        .expect("lookup")
        .expect("item exists");
    assert_eq!(item.status, OutboxStatus::Sent);
}

#[tokio::test(flavor = "multi_thread")]
async fn single_rps_destination_drains_one_item_per_second() {
    let harness = Harness::new().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    harness.add_destination("hooks", RateLimit { rps: 1, max_concurrency: 1 }, &server).await;
    let enqueue = harness.enqueue_service();
    for resource in ["lead-1", "lead-2", "lead-3"] {
        enqueue.enqueue(request("hooks", resource)).await.expect("enqueued");
    }

    let dispatcher = harness.dispatcher(harness.adapters_for("hooks", &server));
    let summary = dispatcher.dispatch(50).await.expect("dispatched");
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.deferred, 2);

    // Deferred items drain one per second as the bucket refills.
    harness.clock.advance_secs(1);
    let summary = dispatcher.dispatch(50).await.expect("dispatched");
    assert_eq!(summary.sent, 1);

    harness.clock.advance_secs(1);
    let summary = dispatcher.dispatch(50).await.expect("dispatched");
    assert_eq!(summary.sent, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn reconciler_requeues_stuck_in_flight_items() {
    let harness = Harness::new().await;
    let server = MockServer::start().await;
    harness.add_destination("hooks", RateLimit { rps: 5, max_concurrency: 5 }, &server).await;

    let enqueue = harness.enqueue_service();
    let item_ref = enqueue.enqueue(request("hooks", "lead-1")).await.expect("enqueued");

    // Simulate a dispatcher that claimed the item seven hours ago and died.
    let stale = harness.clock.epoch_secs() - 7 * 3_600;
    let outcome = harness.store.claim(&item_ref.id, 1, stale).await.expect("claim");
    assert_eq!(outcome, ClaimOutcome::Claimed);

    let reconciler = harness.reconciler(harness.adapters_for("hooks", &server));
    let run = reconciler.reconcile("hooks").await.expect("reconciled");
    assert_eq!(run.items_requeued, 1);

    let item = harness
        .store
        .find_by_idempotency_key(&item_ref.idempotency_key)
        .await
        .expect("lookup")
        .expect("item exists");
    assert_eq!(item.status, OutboxStatus::Queued);

    // The run is on the audit trail.
    let last = harness.runs.last_run("hooks").await.expect("query").expect("run recorded");
    assert_eq!(last.id, run.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn reconciler_leaves_dead_letter_items_alone() {
    let harness = Harness::new().await;
    let server = MockServer::start().await;
    harness.add_destination("hooks", RateLimit { rps: 5, max_concurrency: 5 }, &server).await;

    let enqueue = harness.enqueue_service();
    let item_ref = enqueue.enqueue(request("hooks", "lead-1")).await.expect("enqueued");

    // An item exhausted and dead-lettered eight hours ago is well past the
    // stuck threshold, but terminal rows are not the sweep's business.
    let stale = harness.clock.epoch_secs() - 8 * 3_600;
    harness.store.claim(&item_ref.id, 1, stale).await.expect("claim");
    harness
        .store
        .mark_dead_letter(&item_ref.id, 5, "HTTP 400: invalid payload", stale)
        .await
        .expect("dead letter");

    let reconciler = harness.reconciler(harness.adapters_for("hooks", &server));
    let run = reconciler.reconcile("hooks").await.expect("reconciled");
    assert_eq!(run.items_requeued, 0);

    let item = harness
        .store
        .find_by_idempotency_key(&item_ref.idempotency_key)
        .await
        .expect("lookup")
        .expect("item exists");
    assert_eq!(item.status, OutboxStatus::DeadLetter);
    assert_eq!(item.attempt_count, 5);
}
