//! Relayed exchange through an automation webhook
//!
//! The webhook holds the client secret and talks to the provider. It receives
//! a JSON action and answers `{ "success": bool, "token_info": {..}, "error": ".." }`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::exchange::TokenExchanger;
use super::http::{build_http_client, read_json, unreachable};
use super::types::{CodeExchangeRequest, OAuthError, ProviderTokens, RefreshRequest};
use crate::config::OAuthSettings;
use crate::observability::redact;

/// Relay action names
const ACTION_CALLBACK: &str = "oauth_callback";
const ACTION_REFRESH: &str = "refresh_token";

#[derive(Serialize)]
struct RelayRequest<'a> {
    action: &'static str,
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_verifier: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

#[derive(Deserialize)]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    token_info: Option<ProviderTokens>,
    #[serde(default)]
    error: Option<String>,
}

/// Delegates exchanges to a webhook
pub struct RelayExchanger {
    client: reqwest::Client,
    webhook_url: String,
    bearer_secret: Option<String>,
}

impl std::fmt::Debug for RelayExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayExchanger")
            .field("webhook_url", &self.webhook_url)
            .field("authenticated", &self.bearer_secret.is_some())
            .finish_non_exhaustive()
    }
}

impl RelayExchanger {
    /// Create a relay exchanger targeting `webhook_url`
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Configuration`] if the HTTP client cannot be built.
    pub fn new(settings: &OAuthSettings, webhook_url: &str) -> Result<Self, OAuthError> {
        Ok(Self {
            client: build_http_client(settings.http_timeout())?,
            webhook_url: webhook_url.to_string(),
            bearer_secret: settings.relay_secret.clone().filter(|s| !s.is_empty()),
        })
    }

    async fn call(&self, request: &RelayRequest<'_>) -> Result<RelayResponse, OAuthError> {
        let mut builder = self.client.post(&self.webhook_url).json(request);
        if let Some(secret) = &self.bearer_secret {
            builder = builder.bearer_auth(secret);
        }
        let response = builder.send().await.map_err(unreachable)?;
        read_json(response).await
    }
}

fn token_info(response: RelayResponse) -> Result<ProviderTokens, OAuthError> {
    response
        .token_info
        .ok_or_else(|| OAuthError::ParseFailure("relay response is missing token_info".to_string()))
}

#[async_trait]
impl TokenExchanger for RelayExchanger {
    async fn exchange_code(
        &self,
        request: &CodeExchangeRequest,
    ) -> Result<ProviderTokens, OAuthError> {
        tracing::debug!(
            user_id = %request.user_id,
            code = %redact(&request.code),
            "Relaying authorization code to webhook"
        );

        let response = self
            .call(&RelayRequest {
                action: ACTION_CALLBACK,
                user_id: &request.user_id,
                code: Some(&request.code),
                state: Some(&request.state),
                redirect_uri: Some(&request.redirect_uri),
                code_verifier: request.code_verifier.as_deref(),
                refresh_token: None,
            })
            .await?;

        if !response.success {
            let reason = response
                .error
                .unwrap_or_else(|| "relay reported failure".to_string());
            return Err(OAuthError::UpstreamRejected(reason));
        }
        token_info(response)
    }

    async fn refresh_token(&self, request: &RefreshRequest) -> Result<ProviderTokens, OAuthError> {
        tracing::debug!(
            user_id = %request.user_id,
            refresh_token = %redact(&request.refresh_token),
            "Relaying refresh token to webhook"
        );

        let response = self
            .call(&RelayRequest {
                action: ACTION_REFRESH,
                user_id: &request.user_id,
                code: None,
                state: None,
                redirect_uri: None,
                code_verifier: None,
                refresh_token: Some(&request.refresh_token),
            })
            .await?;

        if !response.success {
            tracing::info!(
                user_id = %request.user_id,
                reason = response.error.as_deref().unwrap_or("unspecified"),
                "Relay rejected refresh token"
            );
            return Err(OAuthError::ReauthorizationRequired);
        }
        token_info(response)
    }

    fn strategy(&self) -> &'static str {
        "relay"
    }
}
