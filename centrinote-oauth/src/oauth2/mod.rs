//! OAuth2 authorization-code flow with state and PKCE
//!
//! The flow runs in four stages:
//!
//! 1. [`pkce`] generates `state` and the PKCE pair; [`agent`] stores the handshake
//! 2. [`authorize`] builds the provider URL the browser is redirected to
//! 3. [`callback`] validates the return and exchanges the code through an
//!    [`exchange::TokenExchanger`] ([`direct`] or [`relay`])
//! 4. [`refresh`] keeps tokens in the [`store`] usable afterwards
//!
//! # Example
//!
//! ```rust,no_run
//! use acton_reactive::prelude::*;
//! use centrinote_oauth::oauth2::{build_authorization_url, HandshakeStore};
//! use centrinote_oauth::config::CentrinoteConfig;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut runtime = ActonApp::launch_async().await;
//! let config = CentrinoteConfig::load_for_service("centrinote-oauth")?;
//! let handshakes = HandshakeStore::spawn(&mut runtime, Duration::from_secs(300)).await?;
//!
//! let handshake = handshakes.begin(Some("u1".into()), "/dashboard".into(), true).await?;
//! let url = build_authorization_url(&handshake, &config.oauth)?;
//! println!("Redirect to {url}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod authorize;
pub mod callback;
pub mod direct;
pub mod exchange;
pub mod handlers;
pub mod http;
pub mod pkce;
pub mod refresh;
pub mod relay;
pub mod store;
pub mod types;

pub use agent::{CleanupExpired, ConsumeOutcome, HandshakeAgent, HandshakeStore};
pub use authorize::{build_authorization_url, sanitize_redirect_path};
pub use callback::{CallbackParams, CallbackProcessor, CallbackState, CallbackSuccess};
pub use direct::DirectExchanger;
pub use exchange::{build_exchanger, TokenExchanger};
pub use pkce::{begin_handshake, code_challenge, generate_code_verifier, generate_state, verify_challenge};
pub use refresh::TokenService;
pub use relay::RelayExchanger;
pub use store::{MemoryTokenStore, PgTokenStore, TokenStore};
pub use types::{
    AccessToken, CodeExchangeRequest, ConnectionStatus, OAuthError, OAuthHandshake,
    ProviderTokens, RefreshRequest, TokenRecord,
};
