//! Shared HTTP plumbing: client construction and status classification.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use quillpin_shared::{ProviderError, QuillpinError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const USER_AGENT: &str = concat!("quillpin/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body kept in messages.
const BODY_SNIPPET: usize = 200;

/// Client shared by every provider built from one registry.
pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| QuillpinError::config(format!("failed to build HTTP client: {e}")))
}

/// Send a request and decode a JSON body, classifying every failure.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> std::result::Result<T, ProviderError> {
    let response = request.send().await.map_err(|e| ProviderError::Transient {
        provider: provider.to_string(),
        message: describe_transport_error(e),
    })?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.map_err(|e| ProviderError::Transient {
        provider: provider.to_string(),
        message: format!("failed to read response body: {e}"),
    })?;

    debug!(provider, status = status.as_u16(), body_len = body.len(), "provider response");

    if !status.is_success() {
        return Err(classify_status(provider, status, &headers, &body));
    }

    serde_json::from_str(&body).map_err(|e| ProviderError::MalformedResponse {
        provider: provider.to_string(),
        message: format!("undecodable response: {e}"),
    })
}

/// Map a non-success status to the provider error taxonomy.
pub(crate) fn classify_status(
    provider: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> ProviderError {
    let provider = provider.to_string();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthenticated {
            provider,
            message: format!("HTTP {}: {}", status.as_u16(), snippet(body)),
        },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            provider,
            retry_after_secs: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
        },
        _ => ProviderError::Transient {
            provider,
            message: format!("HTTP {}: {}", status.as_u16(), snippet(body)),
        },
    }
}

/// The URL is dropped so query-string credentials never reach logs.
fn describe_transport_error(e: reqwest::Error) -> String {
    let e = e.without_url();
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_SNIPPET) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
