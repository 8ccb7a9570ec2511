//! Error types and HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::oauth2::types::OAuthError;

/// Service error type
#[derive(Debug, Error)]
pub enum CentrinoteError {
    /// OAuth flow or token lifecycle error
    #[error(transparent)]
    OAuth(#[from] OAuthError),
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable kind
    pub error: &'static str,
    /// User-readable message
    pub message: String,
}

impl CentrinoteError {
    /// HTTP status for this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::OAuth(err) => oauth_status(err),
        }
    }

    /// Response body for this error
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        match self {
            Self::OAuth(err) => ErrorBody {
                error: err.kind(),
                message: match err {
                    // Internal details stay in the logs
                    OAuthError::EntropyUnavailable(_)
                    | OAuthError::Configuration(_)
                    | OAuthError::HandshakeStore(_) => "Internal server error".to_string(),
                    other => other.user_message(),
                },
            },
        }
    }
}

const fn oauth_status(err: &OAuthError) -> StatusCode {
    match err {
        OAuthError::ProviderDenied { .. } | OAuthError::MalformedCallback(_) => {
            StatusCode::BAD_REQUEST
        }
        OAuthError::HandshakeExpiredOrMissing => StatusCode::GONE,
        OAuthError::CsrfValidationFailed | OAuthError::IdentityMismatch => StatusCode::FORBIDDEN,
        OAuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
        OAuthError::NotConnected => StatusCode::NOT_FOUND,
        OAuthError::UpstreamStatus { .. }
        | OAuthError::UpstreamRejected(_)
        | OAuthError::UpstreamUnreachable(_)
        | OAuthError::ParseFailure(_) => StatusCode::BAD_GATEWAY,
        OAuthError::ReauthorizationRequired => StatusCode::CONFLICT,
        OAuthError::EntropyUnavailable(_)
        | OAuthError::Configuration(_)
        | OAuthError::Storage(_)
        | OAuthError::HandshakeStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for CentrinoteError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: OAuthError) -> StatusCode {
        CentrinoteError::from(err).status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(OAuthError::MalformedCallback("missing code")), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(OAuthError::HandshakeExpiredOrMissing), StatusCode::GONE);
        assert_eq!(status_of(OAuthError::CsrfValidationFailed), StatusCode::FORBIDDEN);
        assert_eq!(status_of(OAuthError::IdentityMismatch), StatusCode::FORBIDDEN);
        assert_eq!(status_of(OAuthError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(OAuthError::NotConnected), StatusCode::NOT_FOUND);
        assert_eq!(status_of(OAuthError::ReauthorizationRequired), StatusCode::CONFLICT);
        assert_eq!(
            status_of(OAuthError::UpstreamRejected("no".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(OAuthError::EntropyUnavailable("os".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let body = CentrinoteError::from(OAuthError::Configuration(
            "invalid redirect URI: https://internal".into(),
        ))
        .body();
        assert_eq!(body.error, "configuration");
        assert_eq!(body.message, "Internal server error");
    }

    #[test]
    fn test_body_uses_kind_and_message() {
        let body = CentrinoteError::from(OAuthError::CsrfValidationFailed).body();
        assert_eq!(body.error, "csrf_validation_failed");
        assert!(body.message.contains("CSRF"));
    }
}
