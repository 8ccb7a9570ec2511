//! Authorization redirect construction
//!
//! Pure functions: nothing here performs I/O.

use oauth2::{
    basic::BasicClient, url::Url, AuthUrl, ClientId, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope,
};

use super::types::{OAuthError, OAuthHandshake};
use crate::config::OAuthSettings;

/// Build the provider authorization URL for a handshake
///
/// Produces `response_type=code`, `client_id`, `redirect_uri`, `state`,
/// `scope` and, when the handshake carries a PKCE verifier,
/// `code_challenge` + `code_challenge_method=S256`.
///
/// # Errors
///
/// Returns [`OAuthError::Configuration`] if the authorize URL or redirect URI
/// cannot be parsed.
pub fn build_authorization_url(
    handshake: &OAuthHandshake,
    settings: &OAuthSettings,
) -> Result<Url, OAuthError> {
    // oauth2 5.0 API: BasicClient::new() only takes ClientId
    let client = BasicClient::new(ClientId::new(settings.client_id.clone()))
        .set_auth_uri(
            AuthUrl::new(settings.authorize_url.clone())
                .map_err(|e| OAuthError::Configuration(format!("invalid authorize URL: {e}")))?,
        )
        .set_redirect_uri(
            RedirectUrl::new(settings.redirect_uri.clone())
                .map_err(|e| OAuthError::Configuration(format!("invalid redirect URI: {e}")))?,
        );

    let state = handshake.state.clone();
    let mut builder = client.authorize_url(move || CsrfToken::new(state));

    for scope in &settings.scopes {
        builder = builder.add_scope(Scope::new(scope.clone()));
    }

    if let Some(verifier) = &handshake.code_verifier {
        let challenge =
            PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(verifier.clone()));
        builder = builder.set_pkce_challenge(challenge);
    }

    let (url, _state) = builder.url();
    Ok(url)
}

/// Accept a same-origin absolute path or fall back to `default`
///
/// Rejects protocol-relative (`//host`), scheme-bearing, backslash and
/// control-character paths so that the post-login redirect cannot leave the
/// application.
#[must_use]
pub fn sanitize_redirect_path(requested: Option<&str>, default: &str) -> String {
    match requested {
        Some(path) if is_local_path(path) => path.to_string(),
        _ => default.to_string(),
    }
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.contains("://")
        && !path.chars().any(char::is_control)
}
