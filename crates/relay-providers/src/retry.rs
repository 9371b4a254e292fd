//! Shared HTTP plumbing for provider adapters: retry with exponential
//! backoff for blocking requests, and stream opening for SSE requests.

use relay_core::{RelayError, RelayResult};
use std::time::Duration;
use tracing::warn;

/// Per-attempt timeout applied to every provider HTTP client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Retry policy for blocking provider calls.
///
/// Transient failures (connect errors, 5xx responses) are retried with
/// exponential backoff; 4xx responses are fatal and surface immediately.
/// Cancellation propagates as soon as the enclosing future is dropped, so the
/// backoff sleeps never outlive the request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Send a request, retrying transient failures, and return the response
    /// body on success.
    ///
    /// # Errors
    /// Returns the last error once attempts are exhausted, or immediately on
    /// a 4xx response.
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
        provider: &'static str,
    ) -> RelayResult<String> {
        let mut delay = self.initial_backoff;
        let mut last_err: Option<RelayError> = None;

        for attempt in 1..=self.max_attempts {
            let req = request.try_clone().ok_or_else(|| {
                RelayError::internal("request body must be cloneable for retries")
            })?;

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(|e| {
                        RelayError::provider(
                            provider,
                            format!("failed to read response body: {e}"),
                            None,
                            false,
                        )
                    })?;

                    if status.is_success() {
                        return Ok(body);
                    }

                    let err = RelayError::provider(
                        provider,
                        format!(
                            "API error (attempt {attempt}/{}): status {}, body: {body}",
                            self.max_attempts,
                            status.as_u16()
                        ),
                        Some(status.as_u16()),
                        status.is_server_error(),
                    );

                    // Client errors will not heal on retry.
                    if status.is_client_error() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(RelayError::provider(
                        provider,
                        format!(
                            "request failed (attempt {attempt}/{}): {e}",
                            self.max_attempts
                        ),
                        None,
                        true,
                    ));
                }
            }

            if attempt < self.max_attempts {
                warn!(
                    provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying provider request"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(last_err
            .unwrap_or_else(|| RelayError::provider(provider, "retries exhausted", None, false)))
    }
}

/// Open a streaming request and hand back the raw response.
///
/// Streaming requests are not retried: a consumer may already have observed
/// part of the stream by the time a failure shows up.
///
/// # Errors
/// Returns a provider error carrying the response body on non-2xx statuses.
pub async fn open_stream(
    request: reqwest::RequestBuilder,
    provider: &'static str,
) -> RelayResult<reqwest::Response> {
    let response = request.send().await.map_err(|e| {
        RelayError::provider(provider, format!("failed to start stream: {e}"), None, true)
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RelayError::provider(
            provider,
            format!("stream error: status {}, body: {body}", status.as_u16()),
            Some(status.as_u16()),
            status.is_server_error(),
        ));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn success_returns_body_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let body = fast_policy()
            .send(client.post(format!("{}/v1/test", server.uri())).body("{}"), "test")
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let body = fast_policy()
            .send(client.post(server.uri()).body("{}"), "test")
            .await
            .unwrap();
        assert_eq!(body, "recovered");
    }

    #[tokio::test]
    async fn client_errors_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = fast_policy()
            .send(client.post(server.uri()).body("{}"), "test")
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("status 400"));
    }

    #[tokio::test]
    async fn exhausted_retries_surface_attempt_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = fast_policy()
            .send(client.post(server.uri()).body("{}"), "test")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("attempt 3/3"));
    }

    #[tokio::test]
    async fn open_stream_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("no key"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = open_stream(client.post(server.uri()), "test").await.unwrap_err();
        assert!(err.to_string().contains("no key"));
    }
}
