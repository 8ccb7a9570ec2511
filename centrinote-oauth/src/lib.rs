//! centrinote-oauth: provider account linking for Centrinote
//!
//! Implements the OAuth 2.0 authorization-code flow with `state` and PKCE
//! (S256) against a meeting provider, and keeps the resulting tokens usable:
//!
//! - **Handshake store**: an acton-reactive agent holding pending handshakes
//!   keyed by `state`, consumed exactly once, expiring after a short TTL
//! - **Redirect builder**: provider authorization URL construction
//! - **Callback processor**: state/CSRF validation, identity policy and code exchange
//! - **Token exchange**: direct token-endpoint calls or a relay webhook
//! - **Token service**: storage, transparent refresh and disconnect
//!
//! Client secrets and tokens never leave the server; the browser only sees
//! redirects and non-secret connection metadata.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use centrinote_oauth::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     centrinote_oauth::observability::init()?;
//!
//!     let config = CentrinoteConfig::load_for_service("centrinote-oauth")?;
//!     if let Err(errors) = config.validate() {
//!         for error in errors {
//!             eprintln!("config: {error}");
//!         }
//!         anyhow::bail!("invalid configuration");
//!     }
//!
//!     centrinote_oauth::server::serve(config).await
//! }
//! ```

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod oauth2;
pub mod observability;
pub mod server;
pub mod state;

pub mod prelude {
    //! Convenience re-exports for common types and traits

    pub use crate::auth::{OptionalSessionUser, SessionUser, SessionVerifier};
    pub use crate::config::{CentrinoteConfig, IdentityPolicy, StateValidation};
    pub use crate::error::CentrinoteError;
    pub use crate::oauth2::{
        AccessToken, CallbackProcessor, ConnectionStatus, HandshakeStore, OAuthError,
        OAuthHandshake, TokenExchanger, TokenRecord, TokenService, TokenStore,
    };
    pub use crate::state::AppState;
}
