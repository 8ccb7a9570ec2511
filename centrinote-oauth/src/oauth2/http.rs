//! Shared HTTP plumbing for the token endpoint and the relay webhook
//!
//! Redirects are disabled (a token endpoint must never bounce credentials to
//! another host) and every call has a timeout.

use serde::de::DeserializeOwned;
use std::time::Duration;

use super::types::OAuthError;

/// Longest upstream error message carried into [`OAuthError::UpstreamStatus`]
const MAX_UPSTREAM_MESSAGE: usize = 200;

/// Build the client used for server-to-server token calls
///
/// # Errors
///
/// Returns [`OAuthError::Configuration`] if the TLS backend cannot be initialized.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, OAuthError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|e| OAuthError::Configuration(format!("HTTP client: {e}")))
}

/// Map a transport failure
pub(crate) fn unreachable(err: reqwest::Error) -> OAuthError {
    let reason = if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.without_url().to_string()
    };
    OAuthError::UpstreamUnreachable(reason)
}

/// Read a JSON success body or turn a non-2xx response into an error
///
/// # Errors
///
/// - [`OAuthError::UpstreamStatus`] for non-success statuses
/// - [`OAuthError::UpstreamUnreachable`] if the body cannot be read
/// - [`OAuthError::ParseFailure`] if the body is not the expected JSON
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, OAuthError> {
    let status = response.status();
    let body = response.text().await.map_err(unreachable)?;

    if !status.is_success() {
        return Err(OAuthError::UpstreamStatus {
            status: status.as_u16(),
            message: upstream_message(&body),
        });
    }

    serde_json::from_str(&body).map_err(|e| OAuthError::ParseFailure(e.to_string()))
}

/// Extract a short human-readable reason from an upstream error body
///
/// Understands the RFC 6749 `error`/`error_description` shape as well as the
/// `{ "reason": .. }` and `{ "message": .. }` shapes some providers use.
pub(crate) fn upstream_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|value| value.get(name))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    };

    let message = field("error_description")
        .or_else(|| field("reason"))
        .or_else(|| field("message"))
        .or_else(|| field("error"))
        .unwrap_or_else(|| body.trim().to_string());

    if message.is_empty() {
        return "empty response body".to_string();
    }
    message.chars().take(MAX_UPSTREAM_MESSAGE).collect()
}
