//! HTTP plumbing shared by the REST publishers
//!
//! Builds the `reqwest` client from configuration, maps HTTP failures onto
//! [`PlatformError`] and parses OAuth token endpoint responses.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::{ConfigError, PlatformError, Result};
use crate::types::Account;

/// Build the HTTP client shared by all publishers
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if the client cannot be constructed
/// (e.g. the TLS backend fails to initialise).
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ConfigError::InvalidValue {
            field: "http".to_string(),
            reason: format!("failed to build HTTP client: {}", e),
        })?;
    Ok(client)
}

/// Strip trailing slashes so paths can be appended with `format!("{base}/...")`
pub(crate) fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Map a transport-level failure (no HTTP status) to a platform error
///
/// Only a failed connection is safe to retry. Once the request has been
/// written, a timeout or dropped connection leaves the outcome unknown and
/// is reported as `Unconfirmed`.
pub(crate) fn map_transport_error(error: reqwest::Error, platform: &str, context: &str) -> PlatformError {
    if error.is_connect() {
        PlatformError::Network(format!("{} unreachable ({}): {}", platform, context, error))
    } else if error.is_decode() {
        PlatformError::Rejected(format!(
            "{} returned an unreadable response ({}): {}",
            platform, context, error
        ))
    } else if error.is_builder() {
        PlatformError::Rejected(format!(
            "could not build {} request ({}): {}",
            platform, context, error
        ))
    } else if error.is_timeout() {
        PlatformError::Unconfirmed(format!(
            "{} did not answer before the request timeout ({}); the post may have been created",
            platform, context
        ))
    } else {
        PlatformError::Unconfirmed(format!(
            "{} connection lost before a response ({}): {}",
            platform, context, error
        ))
    }
}

/// Map an HTTP error status to a platform error
///
/// - 401/403 → `Authentication`
/// - 400/422 and other 4xx → `Rejected`
/// - 429 → `RateLimit`, carrying `reset_at` when the response announced one
/// - 5xx → `Network` (retried by the dispatcher)
pub(crate) fn map_status(
    status: StatusCode,
    body: &str,
    reset_at: Option<i64>,
    platform: &str,
    context: &str,
) -> PlatformError {
    let detail = extract_error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    });

    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(format!(
            "{} refused the access token ({}): {}",
            platform, context, detail
        )),
        429 => PlatformError::RateLimit {
            message: format!("{} rate limit exceeded ({}): {}", platform, context, detail),
            reset_at,
        },
        500..=599 => PlatformError::Network(format!(
            "{} server error {} ({}): {}",
            platform,
            status.as_u16(),
            context,
            detail
        )),
        _ => PlatformError::Rejected(format!(
            "{} rejected the request with {} ({}): {}",
            platform,
            status.as_u16(),
            context,
            detail
        )),
    }
}

/// Turn a non-success response into a platform error, consuming the body
pub(crate) async fn error_from_response(response: Response, platform: &str, context: &str) -> PlatformError {
    let status = response.status();
    let reset_at = rate_limit_reset(response.headers(), chrono::Utc::now().timestamp());
    let body = response.text().await.unwrap_or_default();
    debug!(platform, context, status = status.as_u16(), ?reset_at, "platform returned an error response");
    map_status(status, &body, reset_at, platform, context)
}

/// Values at or above this are absolute Unix timestamps, below it a delay in seconds
const EPOCH_THRESHOLD: i64 = 1_000_000_000;

/// Read when a rate limit lifts from `Retry-After` or `X-RateLimit-Reset`
///
/// `Retry-After` is a delay in seconds. The reset headers are an absolute
/// Unix timestamp on X and a delay on aggregator APIs, told apart by size.
pub(crate) fn rate_limit_reset(headers: &HeaderMap, now: i64) -> Option<i64> {
    let header_secs = |name: &str| -> Option<i64> {
        headers
            .get(name)?
            .to_str()
            .ok()?
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs >= 0)
    };

    if let Some(delay) = header_secs("retry-after") {
        return Some(now.saturating_add(delay));
    }

    ["x-ratelimit-reset", "x-rate-limit-reset"]
        .into_iter()
        .find_map(header_secs)
        .map(|value| {
            if value >= EPOCH_THRESHOLD {
                value
            } else {
                now.saturating_add(value)
            }
        })
}

/// Pull a human-readable message out of a JSON error body
///
/// Understands the common shapes: Graph API `{"error": {"message"}}`,
/// OAuth `{"error_description"}`, X `{"detail"}` and plain `{"message"}`.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    let candidates = [
        value.pointer("/error/message"),
        value.get("error_description"),
        value.get("detail"),
        value.get("message"),
        value.get("error"),
    ];

    let found = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string));
    found
}

/// OAuth token endpoint response
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    /// Install the new credentials on the account
    pub fn apply(self, account: &mut Account, now: i64) {
        let expires_at = self.expires_in.map(|secs| now + secs);
        account.install_tokens(self.access_token, self.refresh_token, expires_at);
    }
}

/// Parse a successful token endpoint response and apply it
pub(crate) async fn apply_token_response(
    response: Response,
    account: &mut Account,
    platform: &str,
) -> std::result::Result<(), PlatformError> {
    if !response.status().is_success() {
        return Err(error_from_response(response, platform, "refresh token").await);
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| map_transport_error(e, platform, "parse token response"))?;

    if token.access_token.is_empty() {
        return Err(PlatformError::Authentication(format!(
            "{} token endpoint returned an empty access token",
            platform
        )));
    }

    token.apply(account, chrono::Utc::now().timestamp());
    Ok(())
}
