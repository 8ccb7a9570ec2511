//! Application state
//!
//! Combines configuration, the handshake store agent, the token service and
//! the session verifier into one cloneable value handed to axum.

use acton_reactive::prelude::ActorRuntime;
use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use crate::auth::SessionVerifier;
use crate::config::CentrinoteConfig;
use crate::oauth2::{
    build_exchanger, CallbackProcessor, HandshakeStore, MemoryTokenStore, PgTokenStore,
    TokenExchanger, TokenService, TokenStore,
};

/// Application state for the OAuth service
#[derive(Clone, Debug)]
pub struct AppState {
    config: Arc<CentrinoteConfig>,
    handshakes: HandshakeStore,
    tokens: Arc<TokenService>,
    callback: Arc<CallbackProcessor>,
    sessions: SessionVerifier,
}

impl AppState {
    /// Assemble state from explicit collaborators
    ///
    /// Spawns the handshake store agent on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns error if the handshake store agent cannot be spawned
    pub async fn new(
        runtime: &mut ActorRuntime,
        config: CentrinoteConfig,
        store: Arc<dyn TokenStore>,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> anyhow::Result<Self> {
        let handshakes = HandshakeStore::spawn(runtime, config.security.handshake_ttl()).await?;
        let tokens = Arc::new(TokenService::new(store, exchanger, config.oauth.provider.clone()));
        let callback = Arc::new(CallbackProcessor::new(
            handshakes.clone(),
            tokens.clone(),
            config.oauth.redirect_uri.clone(),
            config.security.state_validation,
            config.security.identity_policy,
        ));
        let sessions = SessionVerifier::new(
            &config.security.session_jwt_secret,
            &config.security.session_audience,
        );

        Ok(Self {
            config: Arc::new(config),
            handshakes,
            tokens,
            callback,
            sessions,
        })
    }

    /// Build state from configuration alone
    ///
    /// Uses Postgres when `database.url` is set (running migrations first),
    /// otherwise an in-memory token store.
    ///
    /// # Errors
    ///
    /// Returns error if the database is unreachable, migrations fail, or the
    /// exchanger cannot be built.
    pub async fn from_config(
        runtime: &mut ActorRuntime,
        config: CentrinoteConfig,
    ) -> anyhow::Result<Self> {
        let store = token_store(&config).await?;
        let exchanger = build_exchanger(&config.oauth)?;
        Self::new(runtime, config, store, exchanger).await
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &CentrinoteConfig {
        &self.config
    }

    /// Handshake store
    #[must_use]
    pub const fn handshakes(&self) -> &HandshakeStore {
        &self.handshakes
    }

    /// Token service
    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Callback processor
    #[must_use]
    pub fn callback(&self) -> &CallbackProcessor {
        &self.callback
    }

    /// Session verifier
    #[must_use]
    pub const fn sessions(&self) -> &SessionVerifier {
        &self.sessions
    }
}

impl FromRef<AppState> for SessionVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

/// Open the configured token store
///
/// # Errors
///
/// Returns error if Postgres is configured but unreachable or migrations fail
pub async fn token_store(config: &CentrinoteConfig) -> anyhow::Result<Arc<dyn TokenStore>> {
    if config.database.url.trim().is_empty() {
        tracing::warn!("No database configured; tokens are kept in memory only");
        return Ok(Arc::new(MemoryTokenStore::new()));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    let store = PgTokenStore::new(pool);
    store.migrate().await?;
    tracing::info!("Connected to token database");
    Ok(Arc::new(store))
}
