//! Core OAuth2 types
//!
//! This module defines the data that flows through the authorization-code
//! handshake: pending handshakes, provider token payloads, persisted token
//! records, and the error taxonomy shared by every stage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::observability::{redact, redact_opt};

/// Default lifetime of a pending handshake, in seconds
pub const DEFAULT_HANDSHAKE_TTL_SECS: u64 = 300;

/// Lifetime assumed when a provider omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// A pending authorization attempt
///
/// Created immediately before the browser is sent to the provider and
/// consumed exactly once by the callback.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthHandshake {
    /// Anti-CSRF nonce round-tripped through the provider
    pub state: String,
    /// PKCE verifier (absent when PKCE is disabled)
    pub code_verifier: Option<String>,
    /// PKCE S256 challenge derived from `code_verifier`
    pub code_challenge: Option<String>,
    /// Identity that initiated the handshake, if known
    pub user_id: Option<String>,
    /// Same-origin path to return to after success
    pub redirect_back_path: String,
    /// Creation time, used to enforce the TTL
    pub created_at: DateTime<Utc>,
}

impl OAuthHandshake {
    /// Whether the handshake is older than `ttl` at `now`
    #[must_use]
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) > ttl
    }
}

impl fmt::Debug for OAuthHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthHandshake")
            .field("state", &redact(&self.state))
            .field("code_verifier", &redact_opt(self.code_verifier.as_deref()))
            .field("code_challenge", &self.code_challenge)
            .field("user_id", &self.user_id)
            .field("redirect_back_path", &self.redirect_back_path)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Token payload returned by the provider's token endpoint
///
/// `{access_token, token_type, refresh_token, expires_in, scope}`
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderTokens {
    /// Access token
    pub access_token: String,
    /// Token type (usually "bearer")
    #[serde(default)]
    pub token_type: Option<String>,
    /// Refresh token, when issued
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Granted scope
    #[serde(default)]
    pub scope: Option<String>,
}

impl ProviderTokens {
    /// Absolute expiry computed from `expires_in` relative to `now`
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::ParseFailure`] for a negative lifetime or one
    /// that does not fit in a timestamp.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, OAuthError> {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        if expires_in < 0 {
            return Err(OAuthError::ParseFailure(format!(
                "token response contained a negative expires_in ({expires_in})"
            )));
        }
        Duration::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                OAuthError::ParseFailure(format!(
                    "token response expires_in out of range ({expires_in})"
                ))
            })
    }
}

impl fmt::Debug for ProviderTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderTokens")
            .field("access_token", &redact(&self.access_token))
            .field("token_type", &self.token_type)
            .field("refresh_token", &redact_opt(self.refresh_token.as_deref()))
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Persisted access/refresh token pair for one (user, provider)
#[derive(Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TokenRecord {
    /// Owning identity
    pub user_id: String,
    /// Provider name (e.g. "zoom")
    pub provider: String,
    /// Access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    /// Granted scope
    pub scope: Option<String>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Build a record from a fresh authorization-code exchange
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::ParseFailure`] if the provider returned an empty
    /// access token or an unusable `expires_in`, so that no partial record is
    /// ever written.
    pub fn from_exchange(
        user_id: &str,
        provider: &str,
        tokens: ProviderTokens,
        now: DateTime<Utc>,
    ) -> Result<Self, OAuthError> {
        ensure_access_token(&tokens)?;
        Ok(Self {
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            expires_at: tokens.expires_at(now)?,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            scope: tokens.scope,
            updated_at: now,
        })
    }

    /// Produce the successor record after a refresh grant
    ///
    /// Providers that do not rotate refresh tokens omit `refresh_token`; the
    /// previous one is kept. The same applies to `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::ParseFailure`] if the access token is empty or
    /// `expires_in` is unusable.
    pub fn refreshed(&self, tokens: ProviderTokens, now: DateTime<Utc>) -> Result<Self, OAuthError> {
        ensure_access_token(&tokens)?;
        Ok(Self {
            user_id: self.user_id.clone(),
            provider: self.provider.clone(),
            expires_at: tokens.expires_at(now)?,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.or_else(|| self.refresh_token.clone()),
            scope: tokens.scope.or_else(|| self.scope.clone()),
            updated_at: now,
        })
    }

    /// Whether the access token is still usable at `now`
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact_opt(self.refresh_token.as_deref()))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

fn ensure_access_token(tokens: &ProviderTokens) -> Result<(), OAuthError> {
    if tokens.access_token.trim().is_empty() {
        return Err(OAuthError::ParseFailure(
            "token response contained an empty access_token".to_string(),
        ));
    }
    Ok(())
}

/// Access token handed to internal callers
///
/// Wraps the secret so it cannot end up in a `Debug` log by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw access token
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Expose the raw token (for an `Authorization` header)
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&redact(&self.0)).finish()
    }
}

/// Non-secret connection metadata safe to return to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Provider name
    pub provider: String,
    /// Whether a token record exists
    pub connected: bool,
    /// Access token expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Last write time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    /// Status for a user without a token record
    #[must_use]
    pub fn disconnected(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            connected: false,
            expires_at: None,
            scope: None,
            updated_at: None,
        }
    }
}

impl From<&TokenRecord> for ConnectionStatus {
    fn from(record: &TokenRecord) -> Self {
        Self {
            provider: record.provider.clone(),
            connected: true,
            expires_at: Some(record.expires_at),
            scope: record.scope.clone(),
            updated_at: Some(record.updated_at),
        }
    }
}

/// Authorization-code exchange input
#[derive(Clone, PartialEq, Eq)]
pub struct CodeExchangeRequest {
    /// Single-use authorization code
    pub code: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// PKCE verifier, when the handshake used PKCE
    pub code_verifier: Option<String>,
    /// The validated state
    pub state: String,
    /// Identity the tokens will belong to
    pub user_id: String,
}

impl fmt::Debug for CodeExchangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeExchangeRequest")
            .field("code", &redact(&self.code))
            .field("redirect_uri", &self.redirect_uri)
            .field("code_verifier", &redact_opt(self.code_verifier.as_deref()))
            .field("state", &redact(&self.state))
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Refresh grant input
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    /// Stored refresh token
    pub refresh_token: String,
    /// Owner of the token record
    pub user_id: String,
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh_token", &redact(&self.refresh_token))
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// OAuth2 errors
///
/// Messages are user-readable and never include secrets.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// The provider returned an `error` parameter
    #[error("Authorization was denied by the provider: {error}")]
    ProviderDenied {
        /// Provider error code (e.g. `access_denied`)
        error: String,
        /// Provider error description
        description: Option<String>,
    },

    /// `code` or `state` missing from the callback
    #[error("Malformed callback: {0}")]
    MalformedCallback(&'static str),

    /// No live handshake for this attempt (TTL passed, cookie lost, or already consumed)
    #[error("Authorization handshake expired or missing; please start again")]
    HandshakeExpiredOrMissing,

    /// Received state did not match the state this browser initiated
    #[error("CSRF validation failed: state mismatch")]
    CsrfValidationFailed,

    /// Callback completed without an authenticated session
    #[error("An authenticated session is required to complete authorization")]
    Unauthenticated,

    /// Session user differs from the user who started the handshake
    #[error("Authorization was started by a different user")]
    IdentityMismatch,

    /// Token endpoint or relay answered with a non-success status
    #[error("Token exchange failed with HTTP {status}: {message}")]
    UpstreamStatus {
        /// HTTP status code returned upstream
        status: u16,
        /// Provider/relay error summary
        message: String,
    },

    /// Relay reported `success: false`
    #[error("Token exchange was rejected by the relay: {0}")]
    UpstreamRejected(String),

    /// Network failure reaching the token endpoint or relay
    #[error("Token exchange failed: upstream unreachable ({0})")]
    UpstreamUnreachable(String),

    /// Upstream body could not be parsed
    #[error("Token exchange failed: parse failure ({0})")]
    ParseFailure(String),

    /// Refresh token rejected; the full authorization flow must be re-run
    #[error("Reauthorization required")]
    ReauthorizationRequired,

    /// No token record exists for the user
    #[error("No connected account for this user")]
    NotConnected,

    /// The operating system could not provide secure randomness
    #[error("Secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    /// Invalid OAuth configuration
    #[error("Invalid OAuth configuration: {0}")]
    Configuration(String),

    /// Token storage failure
    #[error("Token storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Handshake store agent did not answer
    #[error("Handshake store unavailable: {0}")]
    HandshakeStore(String),
}

impl OAuthError {
    /// Stable machine-readable kind
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProviderDenied { .. } => "provider_denied",
            Self::MalformedCallback(_) => "malformed_callback",
            Self::HandshakeExpiredOrMissing => "handshake_expired_or_missing",
            Self::CsrfValidationFailed => "csrf_validation_failed",
            Self::Unauthenticated => "unauthenticated",
            Self::IdentityMismatch => "identity_mismatch",
            Self::UpstreamStatus { .. }
            | Self::UpstreamRejected(_)
            | Self::UpstreamUnreachable(_)
            | Self::ParseFailure(_) => "upstream_exchange_failure",
            Self::ReauthorizationRequired => "reauthorization_required",
            Self::NotConnected => "not_connected",
            Self::EntropyUnavailable(_) => "entropy_unavailable",
            Self::Configuration(_) => "configuration",
            Self::Storage(_) => "storage",
            Self::HandshakeStore(_) => "handshake_store",
        }
    }

    /// Whether this is an upstream exchange failure (token endpoint or relay)
    #[must_use]
    pub const fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            Self::UpstreamStatus { .. }
                | Self::UpstreamRejected(_)
                | Self::UpstreamUnreachable(_)
                | Self::ParseFailure(_)
        )
    }

    /// Message shown to the user
    ///
    /// Provider denials surface the provider's own description verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ProviderDenied {
                description: Some(description),
                ..
            } => description.clone(),
            Self::Storage(_) => "Token storage is unavailable".to_string(),
            other => other.to_string(),
        }
    }
}
