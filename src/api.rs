//! HTTP adapter for the menu REST API.
//!
//! `HttpStore` is the production [`RemoteStore`]: one shared `reqwest`
//! client with a per-request timeout, JSON bodies in both directions, and
//! error messages lifted from the server's JSON body when it has one.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::store::RemoteStore;

/// Default timeout for API requests (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the menu API base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach menu API at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid menu API URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Fallback message when the server gave no usable body.
fn status_error(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => reason.to_string(),
        None => format!("Unexpected response from menu API (HTTP {})", status.as_u16()),
    }
}

/// Pick the error message out of a failed response body: the JSON
/// `message` field, then `error`, then the status text.
pub fn extract_error_message(status: StatusCode, body_text: &str) -> String {
    serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| status_error(status))
}

// ---------------------------------------------------------------------------
// HttpStore
// ---------------------------------------------------------------------------

pub struct HttpStore {
    base_url: String,
    client: Client,
}

impl HttpStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let full_url = format!("{}{path}", self.base_url);
        let started = Instant::now();

        let mut req = self
            .client
            .request(method.clone(), &full_url)
            .header("Content-Type", "application/json");
        if let Some(b) = body {
            req = req.json(&b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::network(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();
        debug!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "menu api request"
        );

        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            let message = extract_error_message(status, &body_text);
            warn!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                error = %message,
                "menu api request failed"
            );
            return Err(TransportError::status(status.as_u16(), message));
        }

        // Return the JSON body, or null for empty 204 responses.
        let body_text = resp
            .text()
            .await
            .map_err(|e| TransportError::network(friendly_error(&self.base_url, &e)))?;
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text)
            .map_err(|e| TransportError::invalid_body(format!("Invalid JSON from menu API: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme_and_strips_slashes() {
        assert_eq!(normalize_base_url("localhost:3001/"), "http://localhost:3001");
        assert_eq!(normalize_base_url("127.0.0.1:3001"), "http://127.0.0.1:3001");
        assert_eq!(normalize_base_url(" menu.example.uz/api// "), "https://menu.example.uz/api");
        assert_eq!(normalize_base_url("http://host"), "http://host");
    }

    #[test]
    fn error_message_prefers_json_message() {
        let msg = extract_error_message(StatusCode::BAD_REQUEST, r#"{"message":"name taken"}"#);
        assert_eq!(msg, "name taken");
        let msg = extract_error_message(StatusCode::BAD_REQUEST, r#"{"error":"bad body"}"#);
        assert_eq!(msg, "bad body");
    }

    #[test]
    fn error_message_falls_back_to_status_text() {
        assert_eq!(extract_error_message(StatusCode::NOT_FOUND, ""), "Not Found");
        assert_eq!(
            extract_error_message(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>"),
            "Internal Server Error"
        );
        assert_eq!(
            extract_error_message(StatusCode::BAD_GATEWAY, r#"{"message":"  "}"#),
            "Bad Gateway"
        );
    }

    #[test]
    fn new_store_normalizes_base_url() {
        let store = HttpStore::new("localhost:3001/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(store.base_url(), "http://localhost:3001");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        // Port 9 (discard) on loopback is closed on test machines.
        let store = HttpStore::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = store
            .request("/branches", Method::GET, None)
            .await
            .expect_err("closed port should fail");
        assert_eq!(err.kind, crate::error::TransportErrorKind::Network);
        assert!(err.status.is_none());
    }
}
