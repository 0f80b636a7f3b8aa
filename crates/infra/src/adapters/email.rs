//! Resend-style transactional email adapter.

use async_trait::async_trait;
use courier_core::provider::{DeliveryOutcome, ProviderAdapter};
use courier_domain::{CourierError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use super::{classify_error, classify_response, HTTP_TIMEOUT};

const DEFAULT_BASE_URL: &str = "https://api.resend.com";

#[derive(Debug, Clone, Deserialize)]
pub struct EmailSettings {
    pub api_key: String,
    /// Sender address stamped onto payloads that omit `from`.
    pub from: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Adapter posting email payloads to a Resend-compatible `/emails` endpoint.
pub struct EmailAdapter {
    client: Client,
    settings: EmailSettings,
}

impl EmailAdapter {
    pub fn from_settings(settings_json: &str) -> Result<Self> {
        let settings: EmailSettings = serde_json::from_str(settings_json)
            .map_err(|e| CourierError::Config(format!("invalid email settings: {e}")))?;
        Self::new(settings)
    }

    pub fn new(settings: EmailSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(CourierError::Config("email api_key must not be empty".into()));
        }

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| CourierError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { client, settings })
    }

    fn with_sender(&self, payload: &Value) -> Value {
        let mut body = payload.clone();
        if let Value::Object(map) = &mut body {
            map.entry("from").or_insert_with(|| Value::String(self.settings.from.clone()));
        }
        body
    }
}

#[async_trait]
impl ProviderAdapter for EmailAdapter {
    #[instrument(skip(self, payload))]
    async fn deliver(&self, operation: &str, payload: &Value) -> DeliveryOutcome {
        if operation != "send_email" {
            return DeliveryOutcome::Permanent {
                reason: format!("unsupported email operation: {operation}"),
            };
        }

        let url = format!("{}/emails", self.settings.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(url)
            .bearer_auth(&self.settings.api_key)
            .json(&self.with_sender(payload));

        match request.send().await {
            Ok(response) => classify_response(response).await,
            Err(err) => classify_error(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn adapter_for(server: &MockServer) -> EmailAdapter {
        EmailAdapter::new(EmailSettings {
            api_key: "re_test_key".into(),
            from: "noreply@example.test".into(),
            base_url: server.uri(),
        })
        .expect("adapter built")
    }

    #[tokio::test]
    async fn deliver_posts_to_emails_endpoint_with_sender() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("Authorization", "Bearer re_test_key"))
            .and(body_json(serde_json::json!({
                "from": "noreply@example.test",
                "to": "ada@example.test",
                "subject": "hello",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "email-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let payload = serde_json::json!({"to": "ada@example.test", "subject": "hello"});
        let outcome = adapter_for(&server).deliver("send_email", &payload).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Success { response: serde_json::json!({"id": "email-1"}) }
        );
    }

    #[tokio::test]
    async fn explicit_sender_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(body_json(serde_json::json!({
                "from": "alerts@example.test",
                "to": "ada@example.test",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let payload =
            serde_json::json!({"from": "alerts@example.test", "to": "ada@example.test"});
        let outcome = adapter_for(&server).deliver("send_email", &payload).await;
        assert!(matches!(outcome, DeliveryOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn unknown_operation_is_permanent() {
        let server = MockServer::start().await;
        let outcome = adapter_for(&server).deliver("create_row", &Value::Null).await;
        assert!(matches!(outcome, DeliveryOutcome::Permanent { .. }));
    }

    #[tokio::test]
    async fn validation_failure_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(422).set_body_string("missing to"))
            .mount(&server)
            .await;

        let outcome =
            adapter_for(&server).deliver("send_email", &serde_json::json!({})).await;
        assert!(matches!(outcome, DeliveryOutcome::Permanent { .. }));
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = EmailAdapter::new(EmailSettings {
            api_key: "  ".into(),
            from: "noreply@example.test".into(),
            base_url: DEFAULT_BASE_URL.into(),
        });
        assert!(result.is_err());
    }
}
