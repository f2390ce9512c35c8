//! HTTP utilities for AI providers
//!
//! Shared request/response handling: one client with bounded timeouts,
//! JSON POST with bearer auth, and mapping of HTTP failures onto [`AiError`].

use crate::ai::AiError;
use crate::config::{get_http_connect_timeout, get_http_request_timeout};
use reqwest::header::HeaderMap;
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Longest error body kept in messages.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Creates an HTTP client with the configured connect and request timeouts.
///
/// Speech synthesis of long texts is slow, so the request timeout is
/// generous (`HTTP_REQUEST_TIMEOUT_SECS`, 180s by default).
#[must_use]
pub fn create_http_client() -> HttpClient {
    HttpClient::builder()
        .connect_timeout(get_http_connect_timeout())
        .timeout(get_http_request_timeout())
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends a JSON POST with bearer auth and returns the successful response.
///
/// # Errors
///
/// Returns [`AiError::Network`] on connectivity issues and the
/// [`classify_status`] mapping on non-success status codes.
pub async fn post_json<B: Serialize + ?Sized>(
    client: &HttpClient,
    url: &str,
    api_key: &str,
    body: &B,
) -> Result<Response, AiError> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(map_reqwest_error)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, retry_after, &body))
}

/// Reads a successful response as JSON.
///
/// # Errors
///
/// Returns [`AiError::Upstream`] if the body can't be read or parsed.
pub async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, AiError> {
    response
        .json()
        .await
        .map_err(|e| AiError::Upstream(format!("invalid response body: {e}")))
}

/// Reads a successful response as raw bytes.
///
/// # Errors
///
/// Returns [`AiError::Network`] if the body can't be read.
pub async fn read_bytes(response: Response) -> Result<Vec<u8>, AiError> {
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(map_reqwest_error)
}

/// Maps a non-success status onto the error taxonomy.
///
/// 429 is a rate limit, 5xx is an upstream failure worth retrying, any other
/// status means the provider rejected the parameters.
#[must_use]
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> AiError {
    let message = format!("HTTP {}: {}", status.as_u16(), extract_error_message(body));

    if status == StatusCode::TOO_MANY_REQUESTS {
        AiError::RateLimited {
            retry_after,
            message,
        }
    } else if status.is_server_error() {
        AiError::Upstream(message)
    } else {
        AiError::ProviderRejected(message)
    }
}

/// Extracts a readable message from an error body.
///
/// OpenAI returns `{"error": {"message": "..."}}`; anything else is
/// truncated, and HTML error pages from proxies are not echoed.
#[must_use]
pub fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(message) = json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
    }

    let trimmed = body.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");
    if is_html {
        return "server returned HTML error page".to_string();
    }

    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        format!("{}...", crate::utils::truncate_str(body, MAX_ERROR_BODY_CHARS))
    } else {
        body.to_string()
    }
}

/// Parses `retry-after-ms` or `retry-after` (seconds) headers.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(ms) = header("retry-after-ms").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_millis(ms));
    }
    header("retry-after")
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Maps a reqwest failure; timeouts and connection errors are transient.
#[must_use]
pub fn map_reqwest_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Network(format!("request timed out: {e}"))
    } else if e.is_builder() {
        AiError::MissingConfig(format!("invalid request: {e}"))
    } else {
        AiError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_openai_error_message_is_extracted() {
        let body = r#"{"error":{"message":"Invalid value for 'size'","type":"invalid_request_error"}}"#;
        assert_eq!(extract_error_message(body), "Invalid value for 'size'");
    }

    #[test]
    fn test_long_body_is_truncated() {
        let body = "x".repeat(900);
        let message = extract_error_message(&body);
        assert_eq!(message.chars().count(), MAX_ERROR_BODY_CHARS + 3);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn test_html_page_is_not_echoed() {
        let message = extract_error_message("<html><body>502 Bad Gateway</body></html>");
        assert_eq!(message, "server returned HTML error page");
    }

    #[test]
    fn test_status_classification() {
        let wait = Some(Duration::from_secs(2));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, wait, ""),
            AiError::RateLimited { retry_after, .. } if retry_after == wait
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None, "oops"),
            AiError::Upstream(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, None, "bad voice"),
            AiError::ProviderRejected(m) if m == "HTTP 400: bad voice"
        ));
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("3"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));

        headers.insert("retry-after-ms", HeaderValue::from_static("250"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(250)));

        let mut dated = HeaderMap::new();
        dated.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&dated), None);
    }
}
