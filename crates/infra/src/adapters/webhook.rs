//! Generic webhook adapter
//!
//! Delivers any operation as a JSON POST to a configured URL. Covers the
//! `zapier`, `custom_api` and similar destinations where the receiver owns
//! the semantics.

use async_trait::async_trait;
use courier_core::provider::{DeliveryOutcome, ProbeOutcome, ProviderAdapter};
use courier_domain::{CourierError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{instrument, warn};
use url::Url;

use super::{classify_error, classify_response, HTTP_TIMEOUT};

/// Operation name header attached to every webhook call.
const OPERATION_HEADER: &str = "X-Courier-Operation";

/// Settings parsed from a destination's `settings_json`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    /// Endpoint every delivery is POSTed to.
    pub url: String,
    /// Optional bearer token.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Optional base URL for drift probes; the resource id is appended as a
    /// path segment. Absent means probing is unsupported.
    #[serde(default)]
    pub probe_url: Option<String>,
}

/// Adapter POSTing deliveries to an operator-configured endpoint.
pub struct WebhookAdapter {
    client: Client,
    url: Url,
    auth_token: Option<String>,
    probe_url: Option<Url>,
}

impl WebhookAdapter {
    /// Build an adapter from a destination's settings JSON.
    pub fn from_settings(settings_json: &str) -> Result<Self> {
        let settings: WebhookSettings = serde_json::from_str(settings_json)
            .map_err(|e| CourierError::Config(format!("invalid webhook settings: {e}")))?;
        Self::new(settings)
    }

    pub fn new(settings: WebhookSettings) -> Result<Self> {
        let url = Url::parse(&settings.url)
            .map_err(|e| CourierError::Config(format!("invalid webhook url: {e}")))?;
        let probe_url = settings
            .probe_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| CourierError::Config(format!("invalid webhook probe url: {e}")))?;

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| CourierError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { client, url, auth_token: settings.auth_token, probe_url })
    }
}

#[async_trait]
impl ProviderAdapter for WebhookAdapter {
    #[instrument(skip(self, payload), fields(url = %self.url))]
    async fn deliver(&self, operation: &str, payload: &Value) -> DeliveryOutcome {
        let mut request = self
            .client
            .post(self.url.clone())
            .header(OPERATION_HEADER, operation)
            .json(payload);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => classify_response(response).await,
            Err(err) => classify_error(err),
        }
    }

    async fn probe(&self, stable_resource_id: &str) -> ProbeOutcome {
        let Some(base) = &self.probe_url else {
            return ProbeOutcome::Unsupported;
        };
        let Ok(url) = base.join(stable_resource_id) else {
            warn!(resource_id = %stable_resource_id, "resource id does not form a valid probe url");
            return ProbeOutcome::Unsupported;
        };

        let mut request = self.client.get(url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => ProbeOutcome::Confirmed,
            Ok(response) if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                ProbeOutcome::RateLimited
            }
            Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                ProbeOutcome::Drift {
                    detail: format!("resource {stable_resource_id} missing at receiver"),
                }
            }
            Ok(response) => {
                warn!(status = %response.status(), "inconclusive probe response");
                ProbeOutcome::Unsupported
            }
            Err(err) => {
                warn!(error = %err, "probe request failed");
                ProbeOutcome::Unsupported
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn adapter_for(server: &MockServer) -> WebhookAdapter {
        WebhookAdapter::new(WebhookSettings {
            url: format!("{}/hook", server.uri()),
            auth_token: Some("secret-token".into()),
            probe_url: Some(format!("{}/resources/", server.uri())),
        })
        .expect("adapter built")
    }

    #[tokio::test]
    async fn deliver_posts_json_with_operation_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("X-Courier-Operation", "create_row"))
            .and(header("Authorization", "Bearer secret-token"))
            .and(body_json(serde_json::json!({"name": "Ada"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome =
            adapter_for(&server).deliver("create_row", &serde_json::json!({"name": "Ada"})).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Success { response: serde_json::json!({"ok": true}) }
        );
    }

    #[tokio::test]
    async fn deliver_classifies_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "90"))
            .mount(&server)
            .await;

        let outcome = adapter_for(&server).deliver("create_row", &Value::Null).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::RateLimited {
                retry_after: Some(std::time::Duration::from_secs(90))
            }
        );
    }

    #[tokio::test]
    async fn deliver_to_unreachable_host_is_transient() {
        // Port 1 refuses connections.
        let adapter = WebhookAdapter::new(WebhookSettings {
            url: "http://127.0.0.1:1/hook".into(),
            auth_token: None,
            probe_url: None,
        })
        .expect("adapter built");

        let outcome = adapter.deliver("create_row", &Value::Null).await;
        assert!(matches!(outcome, DeliveryOutcome::Transient { .. }));
    }

    #[tokio::test]
    async fn probe_confirms_existing_resource() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resources/lead-42"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert_eq!(adapter_for(&server).probe("lead-42").await, ProbeOutcome::Confirmed);
    }

    #[tokio::test]
    async fn probe_reports_drift_on_missing_resource() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resources/lead-42"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let outcome = adapter_for(&server).probe("lead-42").await;
        assert!(matches!(outcome, ProbeOutcome::Drift { .. }));
    }

    #[tokio::test]
    async fn probe_without_probe_url_is_unsupported() {
        let adapter = WebhookAdapter::new(WebhookSettings {
            url: "http://127.0.0.1:1/hook".into(),
            auth_token: None,
            probe_url: None,
        })
        .expect("adapter built");

        assert_eq!(adapter.probe("lead-42").await, ProbeOutcome::Unsupported);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(WebhookAdapter::from_settings("{\"url\": \"not a url\"}").is_err());
        assert!(WebhookAdapter::from_settings("not json").is_err());
    }
}
