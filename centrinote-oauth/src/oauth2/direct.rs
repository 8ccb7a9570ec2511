//! Direct exchange against the provider's token endpoint

use async_trait::async_trait;

use super::exchange::TokenExchanger;
use super::http::{build_http_client, read_json, unreachable};
use super::types::{CodeExchangeRequest, OAuthError, ProviderTokens, RefreshRequest};
use crate::config::OAuthSettings;
use crate::observability::redact;

/// Exchanges tokens with `POST <token_url>` using HTTP Basic client auth
pub struct DirectExchanger {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl std::fmt::Debug for DirectExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectExchanger")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl DirectExchanger {
    /// Create a direct exchanger from OAuth settings
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Configuration`] if the HTTP client cannot be built.
    pub fn new(settings: &OAuthSettings) -> Result<Self, OAuthError> {
        Ok(Self {
            client: build_http_client(settings.http_timeout())?,
            token_url: settings.token_url.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
        })
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<ProviderTokens, OAuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(http::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(unreachable)?;
        read_json(response).await
    }
}

#[async_trait]
impl TokenExchanger for DirectExchanger {
    async fn exchange_code(
        &self,
        request: &CodeExchangeRequest,
    ) -> Result<ProviderTokens, OAuthError> {
        tracing::debug!(
            user_id = %request.user_id,
            code = %redact(&request.code),
            pkce = request.code_verifier.is_some(),
            "Exchanging authorization code with provider"
        );

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", request.code.as_str()),
            ("redirect_uri", request.redirect_uri.as_str()),
        ];
        if let Some(verifier) = &request.code_verifier {
            form.push(("code_verifier", verifier.as_str()));
        }

        self.post_form(&form).await
    }

    async fn refresh_token(&self, request: &RefreshRequest) -> Result<ProviderTokens, OAuthError> {
        tracing::debug!(
            user_id = %request.user_id,
            refresh_token = %redact(&request.refresh_token),
            "Refreshing access token with provider"
        );

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", request.refresh_token.as_str()),
        ];

        match self.post_form(&form).await {
            // invalid_grant (400) or invalid_client/revoked (401)
            Err(OAuthError::UpstreamStatus { status: 400 | 401, message }) => {
                tracing::info!(
                    user_id = %request.user_id,
                    reason = %message,
                    "Refresh token rejected by provider"
                );
                Err(OAuthError::ReauthorizationRequired)
            }
            other => other,
        }
    }

    fn strategy(&self) -> &'static str {
        "direct"
    }
}
