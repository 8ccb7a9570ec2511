//! Session resolution
//!
//! The hosted auth service issues HS256 JWTs. A request is authenticated when
//! it presents a valid token either as `Authorization: Bearer <jwt>` or in the
//! `sb-access-token` cookie; the `sub` claim is the user id.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::cookies::read_cookie;
use crate::error::CentrinoteError;
use crate::oauth2::types::OAuthError;

/// Cookie holding the hosted auth access token
pub const SESSION_COOKIE: &str = "sb-access-token";

/// JWT claims the service relies on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user id)
    pub sub: String,
    /// Expiry (seconds since epoch)
    pub exp: i64,
    /// Audience
    #[serde(default)]
    pub aud: Option<String>,
    /// Email, when present
    #[serde(default)]
    pub email: Option<String>,
}

/// Verifies session JWTs
#[derive(Clone)]
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for SessionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionVerifier")
            .field("audience", &self.validation.aud)
            .finish_non_exhaustive()
    }
}

impl SessionVerifier {
    /// Create a verifier for HS256 tokens with the given audience
    #[must_use]
    pub fn new(secret: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a token and return its claims
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Unauthenticated`] for any invalid, expired or
    /// mis-addressed token.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, OAuthError> {
        decode::<SessionClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected session token");
                OAuthError::Unauthenticated
            })
    }

    /// Resolve the session user from request headers, if any
    ///
    /// The bearer header wins over the cookie when both are present.
    #[must_use]
    pub fn session_from_headers(&self, headers: &HeaderMap) -> Option<SessionUser> {
        let token = bearer_token(headers).or_else(|| read_cookie(headers, SESSION_COOKIE))?;
        self.verify(&token).ok().map(|claims| SessionUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Authenticated user extractor
///
/// Rejects with `401` when no valid session is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    /// User id (`sub` claim)
    pub user_id: String,
    /// Email claim, when present
    pub email: Option<String>,
}

impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    SessionVerifier: FromRef<S>,
{
    type Rejection = CentrinoteError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        SessionVerifier::from_ref(state)
            .session_from_headers(&parts.headers)
            .ok_or(CentrinoteError::OAuth(OAuthError::Unauthenticated))
    }
}

/// Optional session extractor
///
/// Never rejects; yields `None` for anonymous requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalSessionUser(pub Option<SessionUser>);

impl<S> FromRequestParts<S> for OptionalSessionUser
where
    S: Send + Sync,
    SessionVerifier: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            SessionVerifier::from_ref(state).session_from_headers(&parts.headers),
        ))
    }
}
