//! Token exchange seam
//!
//! The service never talks to the provider from the browser. Exchanges run
//! server-side through one of two strategies: a direct call to the provider's
//! token endpoint ([`DirectExchanger`]) or a hand-off to an automation webhook
//! that performs the exchange ([`RelayExchanger`]).

use async_trait::async_trait;
use std::sync::Arc;

use super::direct::DirectExchanger;
use super::relay::RelayExchanger;
use super::types::{CodeExchangeRequest, OAuthError, ProviderTokens, RefreshRequest};
use crate::config::OAuthSettings;

/// Exchanges authorization codes and refresh tokens for provider tokens
///
/// Implementations must not retry a code exchange: authorization codes are
/// single-use by provider rule.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchange an authorization code (`grant_type=authorization_code`)
    ///
    /// # Errors
    ///
    /// Returns an upstream failure variant of [`OAuthError`] when the token
    /// endpoint or relay rejects the code or cannot be reached.
    async fn exchange_code(&self, request: &CodeExchangeRequest)
        -> Result<ProviderTokens, OAuthError>;

    /// Redeem a refresh token (`grant_type=refresh_token`)
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::ReauthorizationRequired`] when the refresh token
    /// itself is rejected; other upstream failures otherwise.
    async fn refresh_token(&self, request: &RefreshRequest)
        -> Result<ProviderTokens, OAuthError>;

    /// Strategy name for logs
    fn strategy(&self) -> &'static str;
}

/// Pick the exchange strategy from configuration
///
/// A configured `relay_webhook_url` selects the relay; otherwise tokens are
/// exchanged directly with the provider.
///
/// # Errors
///
/// Returns [`OAuthError::Configuration`] if the HTTP client cannot be built.
pub fn build_exchanger(settings: &OAuthSettings) -> Result<Arc<dyn TokenExchanger>, OAuthError> {
    let exchanger: Arc<dyn TokenExchanger> = match settings.relay_url() {
        Some(url) => Arc::new(RelayExchanger::new(settings, url)?),
        None => Arc::new(DirectExchanger::new(settings)?),
    };
    tracing::info!(strategy = exchanger.strategy(), "Token exchanger configured");
    Ok(exchanger)
}
