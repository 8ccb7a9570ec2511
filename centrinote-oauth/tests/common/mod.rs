//! Shared helpers for integration tests

#![allow(dead_code)]

use acton_reactive::prelude::*;
use axum::http::{header, HeaderName, HeaderValue};
use axum_test::TestServer;
use centrinote_oauth::auth::{SessionClaims, BINDING_COOKIE};
use centrinote_oauth::config::CentrinoteConfig;
use centrinote_oauth::oauth2::{build_exchanger, MemoryTokenStore};
use centrinote_oauth::server::router;
use centrinote_oauth::state::AppState;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::sync::Arc;
use wiremock::MockServer;

pub const JWT_SECRET: &str = "integration-test-jwt-secret";
pub const REDIRECT_URI: &str = "https://app.example.com/oauth/callback";

/// A running service wired to a mock provider
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub store: Arc<MemoryTokenStore>,
    pub provider: MockServer,
    _runtime: ActorRuntime,
}

pub fn test_config(provider: &MockServer) -> CentrinoteConfig {
    let mut config = CentrinoteConfig::default();
    config.oauth.client_id = "client".to_string();
    config.oauth.client_secret = "secret".to_string();
    config.oauth.redirect_uri = REDIRECT_URI.to_string();
    config.oauth.token_url = format!("{}/oauth/token", provider.uri());
    config.oauth.scopes = vec!["meeting:read".to_string()];
    config.security.session_jwt_secret = JWT_SECRET.to_string();
    config.security.secure_cookies = false;
    config
}

pub async fn spawn_app() -> TestApp {
    let provider = MockServer::start().await;
    spawn_app_with(provider, |_| {}).await
}

pub async fn spawn_app_with(
    provider: MockServer,
    customize: impl FnOnce(&mut CentrinoteConfig),
) -> TestApp {
    let mut config = test_config(&provider);
    customize(&mut config);

    let mut runtime = ActonApp::launch_async().await;
    let store = Arc::new(MemoryTokenStore::new());
    let exchanger = build_exchanger(&config.oauth).expect("exchanger");
    let state = AppState::new(&mut runtime, config, store.clone(), exchanger)
        .await
        .expect("state");
    let server = TestServer::new(router(state.clone())).expect("test server");

    TestApp {
        server,
        state,
        store,
        provider,
        _runtime: runtime,
    }
}

/// Session JWT for `user_id`, signed like the hosted auth service
pub fn session_token(user_id: &str) -> String {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
        aud: Some("authenticated".to_string()),
        email: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("jwt")
}

pub fn bearer(user_id: &str) -> (HeaderName, HeaderValue) {
    let value = format!("Bearer {}", session_token(user_id));
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&value).expect("header value"),
    )
}

pub fn binding(state: &str) -> (HeaderName, HeaderValue) {
    (
        header::COOKIE,
        HeaderValue::from_str(&format!("{BINDING_COOKIE}={state}")).expect("header value"),
    )
}

/// Pull the `state` query parameter out of a provider redirect
pub fn state_from_location(location: &str) -> String {
    let url = reqwest::Url::parse(location).expect("absolute provider URL");
    url.query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state parameter")
}
