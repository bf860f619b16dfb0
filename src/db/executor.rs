//! HTTP execution with per-attempt timeouts and exponential backoff.
//!
//! Transient failures (`DataError::is_retryable`) are retried up to
//! `max_attempts` total attempts. Permanent failures return immediately.
//! Delays are deterministic: `base_delay * 2^(attempt - 1)`, no jitter. A
//! rate-limited response may shorten that delay through `Retry-After`, but
//! never lengthen it, so `RetryPolicy::worst_case` stays a hard bound.

use std::time::Duration;

use serde_json::Value;

use crate::db::transport::{HttpRequest, ResponseBody, snippet};
use crate::error::DataError;

/// Bounds for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Per-attempt deadline covering connect, send and body read.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            timeout: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Sleep after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of every attempt timeout plus every backoff sleep.
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let timeouts = self.timeout.saturating_mul(attempts);
        (1..attempts).fold(timeouts, |total, attempt| {
            total.saturating_add(self.delay_after(attempt))
        })
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: ResponseBody,
}

/// Executes compiled requests against a base URL.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_client(reqwest::Client::new(), policy)
    }

    pub fn with_client(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `request` with the retry policy.
    pub async fn execute(&self, base_url: &str, request: &HttpRequest) -> Result<HttpResponse, DataError> {
        let url = request.url(base_url)?;
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let err = match self.send_once(&url, request, self.policy.timeout).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            // Last attempt: return the error without sleeping
            if attempt >= max_attempts {
                tracing::warn!(
                    url = %url,
                    attempts = attempt,
                    error = %err,
                    "Request failed after all attempts"
                );
                return Err(err);
            }

            let backoff = self.policy.delay_after(attempt);
            let delay = match err.retry_after() {
                Some(suggested) => {
                    let capped = suggested.min(backoff);
                    if capped < suggested {
                        tracing::warn!(
                            url = %url,
                            suggested_ms = suggested.as_millis() as u64,
                            backoff_ms = backoff.as_millis() as u64,
                            "Retry-After capped to the backoff budget"
                        );
                    }
                    capped
                }
                None => backoff,
            };
            tracing::warn!(
                url = %url,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying request after transient error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One attempt with an explicit deadline and no retries.
    pub async fn execute_once(
        &self,
        base_url: &str,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, DataError> {
        let url = request.url(base_url)?;
        self.send_once(&url, request, timeout).await
    }

    async fn send_once(
        &self,
        url: &url::Url,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, DataError> {
        let mut builder = self.client.request(request.method.clone(), url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let network = |e: reqwest::Error| DataError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let exchange = async {
            let response = builder.send().await.map_err(network)?;
            let status = response.status();
            // Parse Retry-After before consuming the body.
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.map_err(network)?;
            Ok::<_, DataError>((status, retry_after, text))
        };

        // Dropping the future on timeout aborts the in-flight request.
        let (status, retry_after, text) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| DataError::Timeout {
                url: url.to_string(),
                timeout,
            })??;

        let body = ResponseBody::parse(&text);
        if status.is_success() {
            return Ok(HttpResponse {
                status: status.as_u16(),
                body,
            });
        }

        let message = error_message(&body)
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| "request failed".to_string());
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited { message, retry_after });
        }
        Err(DataError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// `Retry-After` in delay-seconds form.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Best human-readable message from an error body.
fn error_message(body: &ResponseBody) -> Option<String> {
    match body {
        ResponseBody::Empty => None,
        ResponseBody::Text(text) => Some(snippet(text)),
        ResponseBody::Json(value) => {
            let field = |key: &str| match value.get(key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Object(inner)) => match inner.get("message") {
                    Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    _ => None,
                },
                _ => None,
            };
            field("error")
                .or_else(|| field("message"))
                .or_else(|| Some(snippet(&value.to_string())))
        }
    }
}
