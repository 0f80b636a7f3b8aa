//! Provider adapter abstraction
//!
//! Adapters translate an outbox operation into one provider API call and
//! report the result as a typed outcome. Classification lives here so the
//! dispatcher can route every outcome without knowing provider details.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

/// Outcome of one delivery attempt, already classified by the adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// The provider accepted the call.
    Success {
        /// Provider response body, kept for the audit trail.
        response: Value,
    },
    /// A failure worth retrying with backoff (5xx, timeouts, connect
    /// errors).
    Transient { reason: String },
    /// The provider is shedding load; retry after the given hint when
    /// present.
    RateLimited { retry_after: Option<Duration> },
    /// A failure that will never succeed on retry (validation, auth,
    /// missing resource).
    Permanent { reason: String },
}

/// Result of probing a provider for the remote state of a delivered
/// resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The adapter cannot verify remote state.
    Unsupported,
    /// Remote state agrees with the local `sent` record.
    Confirmed,
    /// Remote state disagrees with the local record.
    Drift { detail: String },
    /// The provider rate limited the probe; stop probing this run.
    RateLimited,
}

/// One external delivery destination.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Perform the provider call for `operation` with `payload`.
    ///
    /// Infrastructure problems are folded into the outcome rather than
    /// surfaced as errors; the dispatcher treats every return value as a
    /// completed attempt.
    async fn deliver(&self, operation: &str, payload: &Value) -> DeliveryOutcome;

    /// Check the provider's view of a previously delivered resource.
    ///
    /// Default: no verification surface.
    async fn probe(&self, stable_resource_id: &str) -> ProbeOutcome {
        let _ = stable_resource_id;
        ProbeOutcome::Unsupported
    }
}

/// Maps destination ids to their adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same id.
    pub fn register(&mut self, destination_id: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        let destination_id = destination_id.into();
        if self.adapters.insert(destination_id.clone(), adapter).is_some() {
            warn!(destination_id = %destination_id, "Replacing registered adapter");
        }
    }

    pub fn get(&self, destination_id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(destination_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAdapter;

    #[async_trait]
    impl ProviderAdapter for NullAdapter {
        async fn deliver(&self, _operation: &str, _payload: &Value) -> DeliveryOutcome {
            DeliveryOutcome::Success { response: Value::Null }
        }
    }

    #[tokio::test]
    async fn registry_lookup_and_replace() {
        let mut registry = AdapterRegistry::new();
        assert!(registry.get("slack").is_none());

        registry.register("slack", Arc::new(NullAdapter));
        assert!(registry.get("slack").is_some());
        assert!(registry.get("notion").is_none());

        // Re-registering replaces the entry rather than panicking.
        registry.register("slack", Arc::new(NullAdapter));
        assert!(registry.get("slack").is_some());
    }

    #[tokio::test]
    async fn probe_defaults_to_unsupported() {
        let adapter = NullAdapter;
        assert_eq!(adapter.probe("lead-42").await, ProbeOutcome::Unsupported);
    }
}
