//! Provider HTTP Plumbing
//!
//! Client construction, error-body parsing and transport error
//! classification shared by the REST adapters. Retry with exponential
//! backoff applies to idempotent status polls only.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use super::providers::{FailureKind, ProviderFailure, ProviderResult};
use crate::core::{CoreError, CoreResult};

/// Longest slice of an unstructured error body kept in messages
const MAX_ERROR_BODY_CHARS: usize = 500;

// =============================================================================
// Client
// =============================================================================

/// Builds an HTTP client with an overall request timeout
pub fn build_client(timeout: Duration) -> CoreResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))
}

// =============================================================================
// Error Parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
}

/// Converts a non-2xx response into a normalized failure.
///
/// Structured `{"error": {"message", "code"}}` bodies are preferred; other
/// bodies are truncated. 429 is quota, 408 a timeout, 5xx transient, and a
/// 400 naming a content or safety policy is a rejection.
pub fn parse_api_error(provider: &str, status: StatusCode, body: &str) -> ProviderFailure {
    let (message, code) = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(ApiErrorResponse {
            error: Some(detail),
        }) => {
            let code = match detail.code {
                Some(serde_json::Value::String(s)) => Some(s),
                Some(serde_json::Value::Null) | None => detail.status,
                Some(other) => Some(other.to_string()),
            };
            (detail.message.unwrap_or_default(), code)
        }
        _ => (body.chars().take(MAX_ERROR_BODY_CHARS).collect(), None),
    };

    let text = match &code {
        Some(code) => format!("{} API error ({}): {} (code: {})", provider, status, message, code),
        None => format!("{} API error ({}): {}", provider, status, message),
    };

    let kind = classify_status(status, code.as_deref(), &message);
    ProviderFailure::new(kind, text)
}

fn classify_status(status: StatusCode, code: Option<&str>, message: &str) -> FailureKind {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return FailureKind::QuotaExhausted;
    }
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        return FailureKind::Timeout;
    }
    if status.is_server_error() {
        return FailureKind::TransientNetwork;
    }
    if status == StatusCode::BAD_REQUEST {
        let hint = format!("{} {}", code.unwrap_or_default(), message).to_ascii_lowercase();
        if hint.contains("content_policy") || hint.contains("safety") || hint.contains("moderation")
        {
            return FailureKind::ContentRejected;
        }
    }
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
        return FailureKind::InvalidRequest;
    }
    FailureKind::Failed
}

/// Classifies a transport-level reqwest error
pub fn classify_transport_error(provider: &str, error: &reqwest::Error) -> ProviderFailure {
    if error.is_timeout() {
        ProviderFailure::timeout(format!("{} request timed out: {}", provider, error))
    } else if error.is_connect() || error.is_request() || error.is_body() {
        ProviderFailure::transient(format!("{} network error: {}", provider, error))
    } else if error.is_decode() {
        ProviderFailure::failed(format!("{} returned an unreadable body: {}", provider, error))
    } else {
        ProviderFailure::transient(format!("{} request failed: {}", provider, error))
    }
}

/// Sends a request and decodes a JSON success body
pub async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> ProviderResult<T> {
    let resp = request
        .send()
        .await
        .map_err(|e| classify_transport_error(provider, &e))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| classify_transport_error(provider, &e))?;

    if !status.is_success() {
        return Err(parse_api_error(provider, status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        ProviderFailure::failed(format!("Failed to parse {} response: {}", provider, e))
    })
}

// =============================================================================
// Retry
// =============================================================================

/// Retry budget for a single adapter request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Only transient network failures are retried in place; quota exhaustion
/// moves on to another model instead
pub fn is_retryable(failure: &ProviderFailure) -> bool {
    failure.kind == FailureKind::TransientNetwork
}

/// Executes an idempotent adapter request with retries and exponential backoff
pub async fn execute_with_retry<F, Fut, T>(
    provider: &str,
    operation: &str,
    policy: RetryPolicy,
    f: F,
) -> ProviderResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 0..attempts {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) || attempt + 1 == attempts {
                    return Err(e);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    "{} {} attempt {} failed, retrying in {}ms: {}",
                    provider,
                    operation,
                    attempt + 1,
                    delay.as_millis(),
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(ProviderFailure::failed(format!(
        "{} {} failed after {} attempts",
        provider, operation, attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_parse_api_error_structured() {
        let body = r#"{"error":{"message":"Rate limit exceeded","code":"rate_limit"}}"#;
        let failure = parse_api_error("dalle", StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(failure.kind, FailureKind::QuotaExhausted);
        assert!(failure.message.contains("Rate limit exceeded"));
        assert!(failure.message.contains("rate_limit"));
    }

    #[test]
    fn test_parse_api_error_content_policy() {
        let body = r#"{"error":{"message":"Your request was rejected","code":"content_policy_violation"}}"#;
        let failure = parse_api_error("dalle", StatusCode::BAD_REQUEST, body);
        assert_eq!(failure.kind, FailureKind::ContentRejected);

        let body = r#"{"error":{"message":"Invalid size","code":null,"status":"INVALID_ARGUMENT"}}"#;
        let failure = parse_api_error("gemini", StatusCode::BAD_REQUEST, body);
        assert_eq!(failure.kind, FailureKind::InvalidRequest);
        assert!(failure.message.contains("INVALID_ARGUMENT"));
    }

    #[test]
    fn test_parse_api_error_unstructured() {
        let body = "x".repeat(2000);
        let failure = parse_api_error("kling", StatusCode::BAD_GATEWAY, &body);
        assert_eq!(failure.kind, FailureKind::TransientNetwork);
        assert!(failure.message.len() < 600);

        let failure = parse_api_error("kling", StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(failure.kind, FailureKind::Failed);
        assert!(failure.message.contains("bad key"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_only_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<u32> =
            execute_with_retry("kling", "poll", RetryPolicy::default(), || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ProviderFailure::transient("503"))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);

        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> =
            execute_with_retry("kling", "poll", RetryPolicy::default(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderFailure::quota("429"))
            })
            .await;
        assert_eq!(result.unwrap_err().kind, FailureKind::QuotaExhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_none_makes_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> =
            execute_with_retry("sora", "poll", RetryPolicy::none(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderFailure::transient("reset"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
