//! Twilio-style SMS adapter.
//!
//! Twilio's Messages API takes form-encoded fields under basic auth, unlike
//! the JSON providers, so the payload is flattened here.

use async_trait::async_trait;
use courier_core::provider::{DeliveryOutcome, ProviderAdapter};
use courier_domain::{CourierError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use super::{classify_error, classify_response, HTTP_TIMEOUT};

const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

#[derive(Debug, Clone, Deserialize)]
pub struct SmsSettings {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number used when the payload omits `from`.
    pub from: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Adapter posting messages to a Twilio-compatible Messages endpoint.
pub struct SmsAdapter {
    client: Client,
    settings: SmsSettings,
}

impl SmsAdapter {
    pub fn from_settings(settings_json: &str) -> Result<Self> {
        let settings: SmsSettings = serde_json::from_str(settings_json)
            .map_err(|e| CourierError::Config(format!("invalid sms settings: {e}")))?;
        Self::new(settings)
    }

    pub fn new(settings: SmsSettings) -> Result<Self> {
        if settings.account_sid.trim().is_empty() || settings.auth_token.trim().is_empty() {
            return Err(CourierError::Config("sms credentials must not be empty".into()));
        }

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| CourierError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self { client, settings })
    }

    fn form_fields(&self, payload: &Value) -> std::result::Result<Vec<(String, String)>, String> {
        let to = payload
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| "payload is missing string field 'to'".to_string())?;
        let body = payload
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| "payload is missing string field 'body'".to_string())?;
        let from = payload
            .get("from")
            .and_then(Value::as_str)
            .unwrap_or(&self.settings.from);

        Ok(vec![
            ("To".to_string(), to.to_string()),
            ("From".to_string(), from.to_string()),
            ("Body".to_string(), body.to_string()),
        ])
    }
}

#[async_trait]
impl ProviderAdapter for SmsAdapter {
    #[instrument(skip(self, payload))]
    async fn deliver(&self, operation: &str, payload: &Value) -> DeliveryOutcome {
        if operation != "send_sms" {
            return DeliveryOutcome::Permanent {
                reason: format!("unsupported sms operation: {operation}"),
            };
        }

        let form = match self.form_fields(payload) {
            Ok(form) => form,
            Err(reason) => return DeliveryOutcome::Permanent { reason },
        };

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.account_sid,
        );
        let request = self
            .client
            .post(url)
            .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
            .form(&form);

        match request.send().await {
            Ok(response) => classify_response(response).await,
            Err(err) => classify_error(err),
        }
    }
}
