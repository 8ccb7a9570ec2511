//! Configuration management for the Centrinote OAuth service
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Bare deployment variables (highest priority): `CLIENT_ID`,
//!    `CLIENT_SECRET`, `REDIRECT_URI`, `AUTHORIZE_URL`, `TOKEN_ENDPOINT_URL`,
//!    `RELAY_WEBHOOK_URL`, `STATE_VALIDATION`, `DATABASE_URL`,
//!    `SUPABASE_JWT_SECRET`
//! 2. Environment variables with the `CENTRINOTE_` prefix, `__` for nesting
//! 3. `./config.toml` (development)
//! 4. `~/.config/centrinote/{service}/config.toml` (user config, XDG)
//! 5. `/etc/centrinote/{service}/config.toml` (system config)
//! 6. Hardcoded defaults (fallback)
//!
//! Example: `CENTRINOTE_SECURITY__HANDSHAKE_TTL_SECS=120`
//!
//! # Example Configuration
//!
//! ```toml
//! [service]
//! name = "centrinote-oauth"
//! port = 8080
//! environment = "production"
//!
//! [database]
//! url = "postgres://localhost/centrinote"
//!
//! [oauth]
//! provider = "zoom"
//! client_id = "abc"
//! client_secret = "shh"
//! redirect_uri = "https://app.centrinote.io/oauth/callback"
//! scopes = ["meeting:read"]
//!
//! [security]
//! state_validation = "strict"
//! handshake_ttl_secs = 300
//! identity_policy = "require_session"
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::observability::redact;
use crate::oauth2::types::DEFAULT_HANDSHAKE_TTL_SECS;

/// Bare variable names accepted without the `CENTRINOTE_` prefix
pub const BARE_ENV_KEYS: [&str; 9] = [
    "CLIENT_ID",
    "CLIENT_SECRET",
    "REDIRECT_URI",
    "AUTHORIZE_URL",
    "TOKEN_ENDPOINT_URL",
    "RELAY_WEBHOOK_URL",
    "STATE_VALIDATION",
    "DATABASE_URL",
    "SUPABASE_JWT_SECRET",
];

/// Map a bare variable to its dotted config key
fn bare_env_target(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    match key.as_str() {
        "token_endpoint_url" => "oauth.token_url".to_string(),
        "authorize_url" => "oauth.authorize_url".to_string(),
        "state_validation" => "security.state_validation".to_string(),
        "database_url" => "database.url".to_string(),
        "supabase_jwt_secret" => "security.session_jwt_secret".to_string(),
        other => format!("oauth.{other}"),
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
}

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name (used for config lookup and logging)
    pub name: String,
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Deployment environment
    pub environment: Environment,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "centrinote-oauth".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            environment: Environment::Development,
        }
    }
}

/// Database settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Postgres connection URL (empty selects the in-memory token store)
    pub url: String,
    /// Maximum pool connections
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
        }
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Connection URLs often embed a password
        let url = self
            .url
            .split_once('@')
            .map_or_else(|| self.url.clone(), |(_, host)| format!("…@{host}"));
        f.debug_struct("DatabaseSettings")
            .field("url", &url)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// OAuth client settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// Provider name stored alongside token records
    pub provider: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret (server-side only)
    pub client_secret: String,
    /// Provider authorization endpoint
    pub authorize_url: String,
    /// Provider token endpoint
    pub token_url: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Send PKCE S256 challenge and verifier
    pub pkce_enabled: bool,
    /// When set, exchanges are relayed to this webhook instead of the token endpoint
    pub relay_webhook_url: Option<String>,
    /// Bearer secret presented to the relay webhook
    pub relay_secret: Option<String>,
    /// Timeout for token endpoint and relay calls
    pub http_timeout_secs: u64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            provider: "zoom".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            authorize_url: "https://zoom.us/oauth/authorize".to_string(),
            token_url: "https://zoom.us/oauth/token".to_string(),
            redirect_uri: String::new(),
            scopes: Vec::new(),
            pkce_enabled: true,
            relay_webhook_url: None,
            relay_secret: None,
            http_timeout_secs: 10,
        }
    }
}

impl OAuthSettings {
    /// Relay webhook URL, when one is configured and not blank
    #[must_use]
    pub fn relay_url(&self) -> Option<&str> {
        self.relay_webhook_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
    }

    /// HTTP timeout as a [`Duration`]
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("pkce_enabled", &self.pkce_enabled)
            .field("relay_webhook_url", &self.relay_webhook_url)
            .field("relay_secret", &self.relay_secret.as_deref().map(redact))
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

/// How strictly the callback enforces the browser binding cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateValidation {
    /// Missing or mismatched binding cookie aborts the callback
    #[default]
    Strict,
    /// Missing or mismatched binding cookie only logs a warning (development only)
    Lenient,
}

/// Which identity receives the tokens at callback time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// A valid session is required; it must match the initiating user
    #[default]
    RequireSession,
    /// Session user if present, otherwise the user recorded in the handshake
    PreferSession,
}

/// `SameSite` attribute for the binding cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
    /// Sent on top-level navigations from the provider
    #[default]
    Lax,
    /// Sent on every request (requires `secure_cookies`)
    None,
}

impl SameSite {
    /// Attribute value as written in `Set-Cookie`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Security settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Binding cookie enforcement
    pub state_validation: StateValidation,
    /// Handshake lifetime in seconds
    pub handshake_ttl_secs: u64,
    /// Identity resolution at callback
    pub identity_policy: IdentityPolicy,
    /// Mark cookies `Secure`
    pub secure_cookies: bool,
    /// `SameSite` for the binding cookie
    pub same_site: SameSite,
    /// HS256 secret used by the hosted auth service to sign session JWTs
    pub session_jwt_secret: String,
    /// Expected `aud` claim of session JWTs
    pub session_audience: String,
    /// Where to send the user when no valid return path was supplied
    pub default_redirect_path: String,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            state_validation: StateValidation::Strict,
            handshake_ttl_secs: DEFAULT_HANDSHAKE_TTL_SECS,
            identity_policy: IdentityPolicy::RequireSession,
            secure_cookies: !cfg!(debug_assertions),
            same_site: SameSite::Lax,
            session_jwt_secret: String::new(),
            session_audience: "authenticated".to_string(),
            default_redirect_path: "/dashboard".to_string(),
        }
    }
}

impl SecuritySettings {
    /// Handshake lifetime as a [`Duration`]
    #[must_use]
    pub const fn handshake_ttl(&self) -> Duration {
        Duration::from_secs(self.handshake_ttl_secs)
    }
}

impl fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecuritySettings")
            .field("state_validation", &self.state_validation)
            .field("handshake_ttl_secs", &self.handshake_ttl_secs)
            .field("identity_policy", &self.identity_policy)
            .field("secure_cookies", &self.secure_cookies)
            .field("same_site", &self.same_site)
            .field("session_jwt_secret", &redact(&self.session_jwt_secret))
            .field("session_audience", &self.session_audience)
            .field("default_redirect_path", &self.default_redirect_path)
            .finish()
    }
}

/// Configuration problems detected by [`CentrinoteConfig::validate`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required field is empty
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    /// Lenient state validation outside development
    #[error("state_validation = \"lenient\" is not allowed in production")]
    LenientInProduction,

    /// TTL of zero would expire every handshake immediately
    #[error("security.handshake_ttl_secs must be greater than zero")]
    ZeroHandshakeTtl,

    /// `SameSite=None` cookies must be `Secure`
    #[error("same_site = \"None\" requires secure_cookies = true")]
    InsecureSameSiteNone,

    /// Default redirect must be a local path
    #[error("security.default_redirect_path must start with a single '/'")]
    InvalidDefaultRedirect,
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CentrinoteConfig {
    /// Service settings
    #[serde(default)]
    pub service: ServiceSettings,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseSettings,

    /// OAuth client settings
    #[serde(default)]
    pub oauth: OAuthSettings,

    /// Security settings
    #[serde(default)]
    pub security: SecuritySettings,
}

impl CentrinoteConfig {
    /// Load configuration for a service using the full precedence chain
    ///
    /// # Errors
    ///
    /// Returns an error if the defaults cannot be serialized, a config file
    /// cannot be parsed, or a value has the wrong type.
    pub fn load_for_service(service_name: &str) -> anyhow::Result<Self> {
        let mut figment =
            Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?));

        let system_config = PathBuf::from("/etc/centrinote")
            .join(service_name)
            .join("config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let user_config = Self::recommended_path(service_name);
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        let config = Self::merge_env(figment).extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file, then apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file contains invalid TOML or a value has the
    /// wrong type.
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let figment = Figment::new()
            .merge(Toml::string(&toml::to_string(&Self::default())?))
            .merge(Toml::file(path));
        let config = Self::merge_env(figment).extract()?;
        Ok(config)
    }

    fn merge_env(figment: Figment) -> Figment {
        figment
            .merge(Env::prefixed("CENTRINOTE_").split("__").lowercase(true))
            .merge(
                Env::raw()
                    .only(&BARE_ENV_KEYS)
                    .map(|key| bare_env_target(key.as_str()).into()),
            )
    }

    /// Recommended XDG config path for a service
    #[must_use]
    pub fn recommended_path(service_name: &str) -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./config.toml"),
            |config_dir| {
                config_dir
                    .join("centrinote")
                    .join(service_name)
                    .join("config.toml")
            },
        )
    }

    /// Check the loaded configuration before serving traffic
    ///
    /// # Errors
    ///
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        let required = [
            ("oauth.client_id", &self.oauth.client_id),
            ("oauth.redirect_uri", &self.oauth.redirect_uri),
            ("oauth.authorize_url", &self.oauth.authorize_url),
            ("security.session_jwt_secret", &self.security.session_jwt_secret),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                errors.push(ConfigError::Missing(name));
            }
        }

        // The client secret and token endpoint live with the relay when one is configured
        if self.oauth.relay_url().is_none() {
            if self.oauth.client_secret.trim().is_empty() {
                errors.push(ConfigError::Missing("oauth.client_secret"));
            }
            if self.oauth.token_url.trim().is_empty() {
                errors.push(ConfigError::Missing("oauth.token_url"));
            }
        }

        if self.service.environment == Environment::Production
            && self.security.state_validation == StateValidation::Lenient
        {
            errors.push(ConfigError::LenientInProduction);
        }

        if self.security.handshake_ttl_secs == 0 {
            errors.push(ConfigError::ZeroHandshakeTtl);
        }

        if self.security.same_site == SameSite::None && !self.security.secure_cookies {
            errors.push(ConfigError::InsecureSameSiteNone);
        }

        let default_path = &self.security.default_redirect_path;
        if !default_path.starts_with('/') || default_path.starts_with("//") {
            errors.push(ConfigError::InvalidDefaultRedirect);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
