//! Shared HTTP execution substrate for provider adapters.
//!
//! Every HTTP-speaking adapter owns an [`HttpTransport`]: a pooled
//! `reqwest::Client` with the configured timeout, a retry loop with
//! exponential backoff, status classification at the HTTP boundary, and the
//! request/response observability the rest of the stack relies on.
//!
//! The request body is stored as bytes in a [`PreparedRequest`] so each retry
//! attempt rebuilds an identical request; a streamed body could only be sent
//! once.
//!
//! # Retry policy (single provider)
//!
//! - 2xx: return the body.
//! - 4xx except 429: classified and returned immediately; the request is
//!   wrong and will stay wrong.
//! - 429 and 5xx: retried with `base * 2^attempt` backoff (jittered, capped),
//!   honoring a `Retry-After` hint on 429.
//! - Transport errors and timeouts: retried on the same schedule.
//!
//! Cross-provider policy is *not* decided here; that is the chain's job.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, parse_retry_after};
use crate::telemetry::{NoopTelemetry, TelemetryHandle, metrics};
use crate::types::TokenUsage;

/// Longest body excerpt carried inside error messages.
const BODY_EXCERPT_LEN: usize = 200;

/// A fully-built HTTP request whose body can be resent on every attempt.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl PreparedRequest {
    /// Serialize `payload` as a JSON POST body.
    pub fn post_json<T: Serialize>(
        url: impl Into<String>,
        headers: Vec<(String, String)>,
        payload: &T,
    ) -> Result<Self> {
        let body = serde_json::to_vec(payload)?;
        let mut headers = headers;
        headers.push(("content-type".to_string(), "application/json".to_string()));
        Ok(Self {
            url: url.into(),
            headers,
            body,
        })
    }
}

/// Pooled HTTP execution with retry, classification, and observability.
#[derive(Debug)]
pub struct HttpTransport {
    provider: String,
    http: reqwest::Client,
    policy: RetryPolicy,
    telemetry: RwLock<TelemetryHandle>,
}

impl HttpTransport {
    /// Build a transport for `provider` with its own connection pool.
    pub fn new(
        provider: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
        telemetry: Option<TelemetryHandle>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            provider: provider.into(),
            http,
            policy: RetryPolicy::default().with_max_retries(max_retries),
            telemetry: RwLock::new(telemetry.unwrap_or_else(|| std::sync::Arc::new(NoopTelemetry))),
        })
    }

    /// Provider name this transport reports under.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Current telemetry sink.
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
            .read()
            .expect("telemetry handle poisoned")
            .clone()
    }

    /// Atomically replace the telemetry sink.
    pub fn set_telemetry(&self, telemetry: TelemetryHandle) {
        *self.telemetry.write().expect("telemetry handle poisoned") = telemetry;
    }

    /// Execute with retries and return the success body.
    pub async fn execute_with_retry(&self, request: &PreparedRequest) -> Result<String> {
        let response = self.execute_until_success(request).await?;
        response.text().await.map_err(Error::from)
    }

    /// Execute with retries and hand back the raw response for streaming
    /// consumption. Retries happen before any body bytes are read, so a
    /// caller that has started consuming chunks is past the retry window.
    pub async fn execute_streaming(&self, request: &PreparedRequest) -> Result<reqwest::Response> {
        self.execute_until_success(request).await
    }

    async fn execute_until_success(&self, request: &PreparedRequest) -> Result<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            match self.send_once(request).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let retry_hint = if status.as_u16() == 429 {
                        response
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(parse_retry_after)
                    } else {
                        None
                    };
                    let body = response.text().await.unwrap_or_default();
                    let err = classify_http_error(&self.provider, status.as_u16(), &body, retry_hint);

                    if !err.retryable_within_provider() || attempt >= self.policy.max_retries {
                        return Err(err);
                    }
                    let delay = self.policy.delay_for(attempt, retry_hint);
                    warn!(
                        target: "llm_relay::ai",
                        provider = %self.provider,
                        status = status.as_u16(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after upstream error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let err = map_transport_error(err);
                    if !err.retryable_within_provider() || attempt >= self.policy.max_retries {
                        return Err(err);
                    }
                    let delay = self.policy.delay_for(attempt, None);
                    warn!(
                        target: "llm_relay::ai",
                        provider = %self.provider,
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transport error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }

    async fn send_once(
        &self,
        request: &PreparedRequest,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut builder = self.http.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder.body(request.body.clone()).send().await
    }

    /// INFO log at request entry.
    pub fn log_request(&self, model: &str, prompt_len: usize) {
        info!(
            target: "llm_relay::ai",
            provider = %self.provider,
            model,
            prompt_len,
            "sending generate request"
        );
    }

    /// INFO log plus success metrics: counter, duration histogram, and token
    /// counters partitioned by kind.
    pub fn observe_success(&self, model: &str, usage: TokenUsage, started: Instant) {
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            target: "llm_relay::ai",
            provider = %self.provider,
            model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            duration_ms,
            "generate request succeeded"
        );

        let telemetry = self.telemetry();
        let labels = [("provider", self.provider.as_str()), ("model", model)];
        telemetry.incr_counter(metrics::REQUEST_SUCCESS, 1, &labels);
        telemetry.record_histogram(metrics::REQUEST_DURATION_MS, duration_ms, &labels);
        if !usage.is_empty() {
            telemetry.incr_counter(
                metrics::REQUEST_TOKENS,
                u64::from(usage.prompt_tokens),
                &[
                    ("provider", self.provider.as_str()),
                    ("model", model),
                    ("kind", "prompt"),
                ],
            );
            telemetry.incr_counter(
                metrics::REQUEST_TOKENS,
                u64::from(usage.completion_tokens),
                &[
                    ("provider", self.provider.as_str()),
                    ("model", model),
                    ("kind", "completion"),
                ],
            );
        }
    }

    /// ERROR log plus the failure counter.
    pub fn observe_error(&self, model: &str, err: &Error) {
        error!(
            target: "llm_relay::ai",
            provider = %self.provider,
            model,
            operation = "generate",
            error = %err,
            "generate request failed"
        );
        self.telemetry().incr_counter(
            metrics::REQUEST_ERROR,
            1,
            &[("provider", self.provider.as_str()), ("model", model)],
        );
    }
}

/// Classify a non-2xx response. Pure over `(status, body, hint)` so the
/// mapping is unit-testable without a server.
pub fn classify_http_error(
    provider: &str,
    status: u16,
    body: &str,
    retry_hint: Option<Duration>,
) -> Error {
    let body = excerpt(body);
    match status {
        401 | 403 => Error::auth(provider, body),
        429 => Error::RateLimited {
            provider: provider.to_string(),
            message: body.to_string(),
            retry_after: retry_hint,
        },
        400 | 404 | 413 | 422 => Error::invalid_request(provider, status, body),
        500..=599 => Error::service_unavailable(provider, format!("status {status}: {body}")),
        _ => Error::Upstream {
            provider: provider.to_string(),
            status,
            message: body.to_string(),
        },
    }
}

fn map_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(err)
    }
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::telemetry::MemoryTelemetry;

    #[test]
    fn test_classify_auth() {
        let err = classify_http_error("openai", 401, "invalid key", None);
        assert!(matches!(err, Error::Auth { .. }));
        let err = classify_http_error("openai", 403, "forbidden", None);
        assert!(matches!(err, Error::Auth { .. }));
    }

    #[test]
    fn test_classify_rate_limit_carries_hint() {
        let err = classify_http_error("openai", 429, "slow down", Some(Duration::from_secs(12)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
        assert!(err.retryable_within_provider());
    }

    #[test]
    fn test_classify_bad_request_not_retryable() {
        let err = classify_http_error("openai", 400, "bad prompt", None);
        assert!(matches!(err, Error::InvalidRequest { status: 400, .. }));
        assert!(!err.retryable_within_provider());
    }

    #[test]
    fn test_classify_server_error_retryable() {
        let err = classify_http_error("anthropic", 503, "overloaded", None);
        assert!(matches!(err, Error::ServiceUnavailable { .. }));
        assert!(err.retryable_within_provider());
    }

    #[test]
    fn test_classify_unexpected_status() {
        let err = classify_http_error("openai", 418, "teapot", None);
        assert!(matches!(err, Error::Upstream { status: 418, .. }));
    }

    #[test]
    fn test_excerpt_truncates_long_bodies() {
        let long = "x".repeat(1000);
        assert_eq!(excerpt(&long).len(), BODY_EXCERPT_LEN);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn test_prepared_request_sets_content_type() {
        let request = PreparedRequest::post_json(
            "https://api.openai.com/v1/chat/completions",
            vec![("authorization".to_string(), "Bearer sk-test".to_string())],
            &serde_json::json!({"model": "gpt-4o-mini"}),
        )
        .unwrap();
        assert!(
            request
                .headers
                .iter()
                .any(|(k, v)| k == "content-type" && v == "application/json")
        );
        assert!(!request.body.is_empty());
    }

    #[tokio::test]
    async fn test_observe_success_emits_metrics() {
        let sink = Arc::new(MemoryTelemetry::new());
        let transport = HttpTransport::new(
            "openai",
            Duration::from_secs(5),
            0,
            Some(sink.clone() as TelemetryHandle),
        )
        .unwrap();

        transport.observe_success("gpt-4o-mini", TokenUsage::new(10, 3), Instant::now());

        assert_eq!(sink.counter_total(metrics::REQUEST_SUCCESS), 1);
        assert_eq!(sink.counter_total(metrics::REQUEST_TOKENS), 13);
        assert_eq!(sink.histograms(metrics::REQUEST_DURATION_MS).len(), 1);
    }

    #[tokio::test]
    async fn test_set_telemetry_replaces_sink() {
        let first = Arc::new(MemoryTelemetry::new());
        let second = Arc::new(MemoryTelemetry::new());
        let transport = HttpTransport::new(
            "openai",
            Duration::from_secs(5),
            0,
            Some(first.clone() as TelemetryHandle),
        )
        .unwrap();

        transport.set_telemetry(second.clone() as TelemetryHandle);
        transport.observe_error("gpt-4o-mini", &Error::timeout());

        assert_eq!(first.counter_total(metrics::REQUEST_ERROR), 0);
        assert_eq!(second.counter_total(metrics::REQUEST_ERROR), 1);
    }
}
