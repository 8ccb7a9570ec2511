//! Token lifecycle: hand out valid access tokens, refresh, disconnect

use chrono::Utc;
use std::sync::Arc;

use super::exchange::TokenExchanger;
use super::store::TokenStore;
use super::types::{
    AccessToken, CodeExchangeRequest, ConnectionStatus, OAuthError, RefreshRequest, TokenRecord,
};

/// Token service for one provider
///
/// Internal callers use [`TokenService::get_valid_token`] before every API
/// call; it refreshes transparently when the stored access token has expired.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    exchanger: Arc<dyn TokenExchanger>,
    provider: String,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("provider", &self.provider)
            .field("strategy", &self.exchanger.strategy())
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a token service
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        exchanger: Arc<dyn TokenExchanger>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            store,
            exchanger,
            provider: provider.into(),
        }
    }

    /// Provider this service manages
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Exchange an authorization code and persist the result
    ///
    /// Nothing is written unless the exchange succeeds with a non-empty
    /// access token.
    ///
    /// # Errors
    ///
    /// Returns the exchanger's error, or [`OAuthError::Storage`].
    pub async fn connect(&self, request: &CodeExchangeRequest) -> Result<TokenRecord, OAuthError> {
        let tokens = self.exchanger.exchange_code(request).await?;
        let record = TokenRecord::from_exchange(&request.user_id, &self.provider, tokens, Utc::now())?;
        let saved = self.store.upsert(&record).await?;

        tracing::info!(
            user_id = %saved.user_id,
            provider = %saved.provider,
            expires_at = %saved.expires_at,
            "Stored provider tokens"
        );
        Ok(saved)
    }

    /// Return a usable access token, refreshing once if the stored one expired
    ///
    /// # Errors
    ///
    /// - [`OAuthError::NotConnected`] when the user has no record
    /// - [`OAuthError::ReauthorizationRequired`] when the refresh token is rejected
    pub async fn get_valid_token(&self, user_id: &str) -> Result<AccessToken, OAuthError> {
        let record = self
            .store
            .find(user_id, &self.provider)
            .await?
            .ok_or(OAuthError::NotConnected)?;

        if record.is_valid_at(Utc::now()) {
            return Ok(AccessToken::new(record.access_token));
        }

        tracing::debug!(user_id = %user_id, "Access token expired, refreshing");
        let refreshed = self.refresh_record(record).await?;
        Ok(AccessToken::new(refreshed.access_token))
    }

    /// Force a refresh of the stored tokens
    ///
    /// # Errors
    ///
    /// - [`OAuthError::NotConnected`] when the user has no record, including
    ///   when it is deleted while the refresh is in flight
    /// - [`OAuthError::ReauthorizationRequired`] when the refresh token is
    ///   missing or rejected; the stored record is left untouched
    pub async fn refresh(&self, user_id: &str) -> Result<TokenRecord, OAuthError> {
        let record = self
            .store
            .find(user_id, &self.provider)
            .await?
            .ok_or(OAuthError::NotConnected)?;
        self.refresh_record(record).await
    }

    async fn refresh_record(&self, record: TokenRecord) -> Result<TokenRecord, OAuthError> {
        match self.redeem(&record).await {
            Err(OAuthError::ReauthorizationRequired) => self.recover_from_race(&record).await,
            other => other,
        }
    }

    async fn redeem(&self, record: &TokenRecord) -> Result<TokenRecord, OAuthError> {
        let Some(refresh_token) = record.refresh_token.clone() else {
            return Err(OAuthError::ReauthorizationRequired);
        };

        let tokens = self
            .exchanger
            .refresh_token(&RefreshRequest {
                refresh_token,
                user_id: record.user_id.clone(),
            })
            .await?;

        let next = record.refreshed(tokens, Utc::now())?;
        let saved = self.store.upsert(&next).await?;

        tracing::info!(
            user_id = %saved.user_id,
            provider = %saved.provider,
            expires_at = %saved.expires_at,
            "Refreshed provider tokens"
        );
        Ok(saved)
    }

    /// A rejected refresh token may mean a concurrent request already rotated
    /// it, or disconnected the account
    async fn recover_from_race(&self, stale: &TokenRecord) -> Result<TokenRecord, OAuthError> {
        let current = self.store.find(&stale.user_id, &self.provider).await?;

        match current {
            None => {
                tracing::debug!(
                    user_id = %stale.user_id,
                    "Account was disconnected during refresh"
                );
                Err(OAuthError::NotConnected)
            }
            Some(current)
                if current.refresh_token.is_some()
                    && current.refresh_token != stale.refresh_token =>
            {
                if current.is_valid_at(Utc::now()) {
                    tracing::debug!(
                        user_id = %stale.user_id,
                        "Refresh token was rotated concurrently; using newer record"
                    );
                    Ok(current)
                } else {
                    self.redeem(&current).await
                }
            }
            _ => {
                tracing::warn!(
                    user_id = %stale.user_id,
                    provider = %self.provider,
                    "Refresh token rejected; reauthorization required"
                );
                Err(OAuthError::ReauthorizationRequired)
            }
        }
    }

    /// Delete the user's tokens (idempotent)
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Storage`] if the backend fails.
    pub async fn disconnect(&self, user_id: &str) -> Result<(), OAuthError> {
        let existed = self.store.delete(user_id, &self.provider).await?;
        tracing::info!(
            user_id = %user_id,
            provider = %self.provider,
            existed = existed,
            "Disconnected provider account"
        );
        Ok(())
    }

    /// Non-secret connection metadata
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Storage`] if the backend fails.
    pub async fn status(&self, user_id: &str) -> Result<ConnectionStatus, OAuthError> {
        let record = self.store.find(user_id, &self.provider).await?;
        Ok(record.as_ref().map_or_else(
            || ConnectionStatus::disconnected(&self.provider),
            ConnectionStatus::from,
        ))
    }
}
