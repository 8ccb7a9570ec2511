//! OAuth2 HTTP handlers
//!
//! - `GET /oauth/authorize` begins a handshake and redirects to the provider
//! - `GET /oauth/callback` completes it
//! - `GET|DELETE /oauth/connection` and `POST /oauth/connection/refresh`
//!   expose the stored connection without ever returning a token

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::authorize::{build_authorization_url, sanitize_redirect_path};
use super::callback::CallbackParams;
use super::types::{ConnectionStatus, OAuthError};
use crate::auth::{
    binding_cookie, clear_binding_cookie, read_cookie, OptionalSessionUser, SessionUser,
    BINDING_COOKIE,
};
use crate::config::IdentityPolicy;
use crate::error::CentrinoteError;
use crate::observability::redact;
use crate::state::AppState;

/// OAuth routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/oauth/authorize", get(authorize))
        .route("/oauth/callback", get(callback))
        .route("/oauth/connection", get(connection).delete(disconnect))
        .route("/oauth/connection/refresh", post(refresh))
}

/// Authorize query parameters
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeParams {
    /// Same-origin path to return to after success
    pub redirect: Option<String>,
}

/// Begin the authorization flow
///
/// Creates and stores a handshake, binds this browser to its `state` with a
/// short-lived cookie, and redirects (303) to the provider.
///
/// # Errors
///
/// - `401` when the identity policy requires a session and none is present
/// - `500` when randomness or the handshake store is unavailable
pub async fn authorize(
    State(state): State<AppState>,
    OptionalSessionUser(session): OptionalSessionUser,
    Query(params): Query<AuthorizeParams>,
) -> Result<impl IntoResponse, CentrinoteError> {
    let config = state.config();

    if session.is_none() && config.security.identity_policy == IdentityPolicy::RequireSession {
        return Err(OAuthError::Unauthenticated.into());
    }

    let redirect_back = sanitize_redirect_path(
        params.redirect.as_deref(),
        &config.security.default_redirect_path,
    );
    let handshake = state
        .handshakes()
        .begin(
            session.map(|user| user.user_id),
            redirect_back,
            config.oauth.pkce_enabled,
        )
        .await?;
    let url = build_authorization_url(&handshake, &config.oauth)?;

    tracing::debug!(
        state = %redact(&handshake.state),
        user_id = ?handshake.user_id,
        "Redirecting to OAuth provider"
    );

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            binding_cookie(&handshake.state, &config.security),
        )]),
        Redirect::to(url.as_str()),
    ))
}

/// Complete the authorization flow
///
/// The binding cookie is cleared on every outcome.
pub async fn callback(
    State(state): State<AppState>,
    OptionalSessionUser(session): OptionalSessionUser,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let bound_state = read_cookie(&headers, BINDING_COOKIE);
    let clear = AppendHeaders([(
        header::SET_COOKIE,
        clear_binding_cookie(&state.config().security),
    )]);

    let outcome = state
        .callback()
        .process(
            params,
            bound_state.as_deref(),
            session.as_ref().map(|user| user.user_id.as_str()),
        )
        .await
        .into_result();

    match outcome {
        Ok(success) => (clear, Redirect::to(&success.redirect_to)).into_response(),
        Err(err) => (clear, CentrinoteError::from(err)).into_response(),
    }
}

/// Connection metadata for the session user
///
/// # Errors
///
/// `401` without a session, `500` on storage failure
pub async fn connection(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<ConnectionStatus>, CentrinoteError> {
    Ok(Json(state.tokens().status(&user.user_id).await?))
}

/// Force a token refresh
///
/// # Errors
///
/// `404` when not connected, `409` when reauthorization is required,
/// `502` when the provider cannot be reached
pub async fn refresh(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<ConnectionStatus>, CentrinoteError> {
    let record = state.tokens().refresh(&user.user_id).await?;
    Ok(Json(ConnectionStatus::from(&record)))
}

/// Delete the stored tokens (idempotent)
///
/// # Errors
///
/// `401` without a session, `500` on storage failure
pub async fn disconnect(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<StatusCode, CentrinoteError> {
    state.tokens().disconnect(&user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
