//! HTTP provider adapters
//!
//! Each adapter owns a [`reqwest::Client`], translates an outbox operation
//! into one provider API call and classifies the result into a
//! [`DeliveryOutcome`]. Classification is shared here so every adapter agrees
//! on what is retryable.

pub mod email;
pub mod sms;
pub mod webhook;

use std::time::Duration;

use courier_core::provider::DeliveryOutcome;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::debug;

pub use email::EmailAdapter;
pub use sms::SmsAdapter;
pub use webhook::WebhookAdapter;

/// Default per-request timeout for all adapters.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Cap on provider body text captured into failure reasons.
const BODY_SNIPPET_LEN: usize = 256;

/// Classify an HTTP response into a delivery outcome.
///
/// - 2xx: success, body kept for the audit trail
/// - 429: rate limited, with the `Retry-After` hint when parseable
/// - 408 and 5xx: transient
/// - any other 4xx: permanent
pub(crate) async fn classify_response(response: Response) -> DeliveryOutcome {
    let status = response.status();

    if status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let response =
            serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body.clone()));
        return DeliveryOutcome::Success { response };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parse_retry_after(&response);
        debug!(?retry_after, "provider rate limited the request");
        return DeliveryOutcome::RateLimited { retry_after };
    }

    let reason = format!("HTTP {}: {}", status.as_u16(), body_snippet(response).await);
    if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        DeliveryOutcome::Transient { reason }
    } else {
        DeliveryOutcome::Permanent { reason }
    }
}

/// Classify a transport-level failure. Anything that never reached the
/// provider is worth retrying, except requests we built wrong ourselves.
pub(crate) fn classify_error(err: reqwest::Error) -> DeliveryOutcome {
    if err.is_builder() {
        DeliveryOutcome::Permanent { reason: format!("invalid request: {err}") }
    } else if err.is_timeout() {
        DeliveryOutcome::Transient { reason: "request timed out".into() }
    } else if err.is_connect() {
        DeliveryOutcome::Transient { reason: format!("connection failed: {err}") }
    } else {
        DeliveryOutcome::Transient { reason: err.to_string() }
    }
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn body_snippet(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    if body.chars().count() > BODY_SNIPPET_LEN {
        body.chars().take(BODY_SNIPPET_LEN).collect()
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn classify(template: ResponseTemplate) -> DeliveryOutcome {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(template).mount(&server).await;
        let response = reqwest::get(server.uri()).await.expect("request sent");
        classify_response(response).await
    }

    #[tokio::test]
    async fn success_keeps_json_body() {
        let outcome =
            classify(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "m1"})))
                .await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Success { response: serde_json::json!({"id": "m1"}) }
        );
    }

    #[tokio::test]
    async fn success_with_non_json_body_falls_back_to_string() {
        let outcome = classify(ResponseTemplate::new(200).set_body_string("ok")).await;
        assert_eq!(outcome, DeliveryOutcome::Success { response: Value::String("ok".into()) });
    }

    #[tokio::test]
    async fn too_many_requests_reads_retry_after() {
        let outcome =
            classify(ResponseTemplate::new(429).insert_header("Retry-After", "120")).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::RateLimited { retry_after: Some(Duration::from_secs(120)) }
        );
    }

    #[tokio::test]
    async fn too_many_requests_without_header_has_no_hint() {
        let outcome = classify(ResponseTemplate::new(429)).await;
        assert_eq!(outcome, DeliveryOutcome::RateLimited { retry_after: None });
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let outcome = classify(ResponseTemplate::new(503).set_body_string("overloaded")).await;
        match outcome {
            DeliveryOutcome::Transient { reason } => {
                assert!(reason.contains("503"));
                assert!(reason.contains("overloaded"));
            }
            other => panic!("expected transient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_errors_are_permanent() {
        let outcome = classify(ResponseTemplate::new(422).set_body_string("bad field")).await;
        assert!(matches!(outcome, DeliveryOutcome::Permanent { .. }));
    }

    #[tokio::test]
    async fn request_timeout_status_is_transient() {
        let outcome = classify(ResponseTemplate::new(408)).await;
        assert!(matches!(outcome, DeliveryOutcome::Transient { .. }));
    }
}
