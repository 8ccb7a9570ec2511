//! End-to-end authorization flow over HTTP

mod common;

use axum::http::{header, StatusCode};
use centrinote_oauth::oauth2::{ConnectionStatus, TokenStore};
use chrono::{Duration, Utc};
use common::{bearer, binding, spawn_app, spawn_app_with, state_from_location};
use serde_json::Value;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn location(response: &axum_test::TestResponse) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
        .to_string()
}

fn set_cookie(response: &axum_test::TestResponse) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("set-cookie header")
        .to_string()
}

async fn mount_token_endpoint(provider: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "AT1",
            "token_type": "bearer",
            "refresh_token": "RT1",
            "expires_in": 3600
        })))
        .expect(expected_calls)
        .mount(provider)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_flow_stores_tokens_and_empties_handshake_store() {
    let app = spawn_app().await;
    mount_token_endpoint(&app.provider, 1).await;
    let (auth_name, auth_value) = bearer("u1");

    let response = app
        .server
        .get("/oauth/authorize?redirect=/notes")
        .add_header(auth_name.clone(), auth_value.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);

    let provider_url = location(&response);
    assert!(provider_url.starts_with("https://zoom.us/oauth/authorize?"));
    assert!(provider_url.contains("response_type=code"));
    assert!(provider_url.contains("code_challenge_method=S256"));
    let state = state_from_location(&provider_url);
    assert!(set_cookie(&response).starts_with(&format!("centrinote_oauth_state={state};")));

    let (cookie_name, cookie_value) = binding(&state);
    let response = app
        .server
        .get(&format!("/oauth/callback?code=abc&state={state}"))
        .add_header(auth_name.clone(), auth_value.clone())
        .add_header(cookie_name, cookie_value)
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/notes");
    assert!(set_cookie(&response).contains("Max-Age=0"));

    let record = app.store.find("u1", "zoom").await.unwrap().unwrap();
    assert_eq!(record.access_token, "AT1");
    assert_eq!(record.refresh_token.as_deref(), Some("RT1"));
    let drift = (record.expires_at - (Utc::now() + Duration::seconds(3600))).num_seconds();
    assert!(drift.abs() <= 5);
    assert!(app.state.handshakes().is_empty().await.unwrap());

    let response = app
        .server
        .get("/oauth/connection")
        .add_header(auth_name, auth_value)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(!response.text().contains("AT1"));
    assert!(!response.text().contains("RT1"));
    let status: ConnectionStatus = response.json();
    assert!(status.connected);
    assert_eq!(status.provider, "zoom");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forged_state_is_rejected_without_exchange() {
    let app = spawn_app().await;
    mount_token_endpoint(&app.provider, 0).await;
    let (auth_name, auth_value) = bearer("u1");

    let response = app
        .server
        .get("/oauth/authorize")
        .add_header(auth_name.clone(), auth_value.clone())
        .await;
    let state = state_from_location(&location(&response));

    let (cookie_name, cookie_value) = binding(&state);
    let response = app
        .server
        .get("/oauth/callback?code=abc&state=attacker-state")
        .add_header(auth_name, auth_value)
        .add_header(cookie_name, cookie_value)
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"], "csrf_validation_failed");
    assert!(app.store.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_callback_without_binding_cookie_is_gone() {
    let app = spawn_app().await;
    mount_token_endpoint(&app.provider, 0).await;
    let (auth_name, auth_value) = bearer("u1");

    let response = app
        .server
        .get("/oauth/authorize")
        .add_header(auth_name.clone(), auth_value.clone())
        .await;
    let state = state_from_location(&location(&response));

    let response = app
        .server
        .get(&format!("/oauth/callback?code=abc&state={state}"))
        .add_header(auth_name, auth_value)
        .await;

    assert_eq!(response.status_code(), StatusCode::GONE);
    let body: Value = response.json();
    assert_eq!(body["error"], "handshake_expired_or_missing");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_replayed_callback_is_gone() {
    let app = spawn_app().await;
    mount_token_endpoint(&app.provider, 1).await;
    let (auth_name, auth_value) = bearer("u1");

    let response = app
        .server
        .get("/oauth/authorize")
        .add_header(auth_name.clone(), auth_value.clone())
        .await;
    let state = state_from_location(&location(&response));
    let uri = format!("/oauth/callback?code=abc&state={state}");

    for expected in [StatusCode::SEE_OTHER, StatusCode::GONE] {
        let (cookie_name, cookie_value) = binding(&state);
        let response = app
            .server
            .get(&uri)
            .add_header(auth_name.clone(), auth_value.clone())
            .add_header(cookie_name, cookie_value)
            .await;
        assert_eq!(response.status_code(), expected);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_provider_denial_surfaces_description() {
    let app = spawn_app().await;
    mount_token_endpoint(&app.provider, 0).await;

    let response = app
        .server
        .get("/oauth/callback?error=access_denied&error_description=User%20declined")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "provider_denied");
    assert_eq!(body["message"], "User declined");
    assert!(set_cookie(&response).contains("Max-Age=0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_authorize_requires_session_by_default() {
    let app = spawn_app().await;

    let response = app.server.get("/oauth/authorize").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert!(app.state.handshakes().is_empty().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_open_redirect_falls_back_to_default() {
    let provider = MockServer::start().await;
    mount_token_endpoint(&provider, 1).await;
    let app = spawn_app_with(provider, |config| {
        config.security.default_redirect_path = "/home".to_string();
    })
    .await;
    let (auth_name, auth_value) = bearer("u1");

    let response = app
        .server
        .get("/oauth/authorize?redirect=//evil.example.com")
        .add_header(auth_name.clone(), auth_value.clone())
        .await;
    let state = state_from_location(&location(&response));

    let (cookie_name, cookie_value) = binding(&state);
    let response = app
        .server
        .get(&format!("/oauth/callback?code=abc&state={state}"))
        .add_header(auth_name, auth_value)
        .add_header(cookie_name, cookie_value)
        .await;

    assert_eq!(location(&response), "/home");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upstream_failure_is_bad_gateway_and_not_retried() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Invalid authorization code"
        })))
        .expect(1)
        .mount(&app.provider)
        .await;
    let (auth_name, auth_value) = bearer("u1");

    let response = app
        .server
        .get("/oauth/authorize")
        .add_header(auth_name.clone(), auth_value.clone())
        .await;
    let state = state_from_location(&location(&response));

    let (cookie_name, cookie_value) = binding(&state);
    let response = app
        .server
        .get(&format!("/oauth/callback?code=abc&state={state}"))
        .add_header(auth_name, auth_value)
        .add_header(cookie_name, cookie_value)
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"], "upstream_exchange_failure");
    assert!(app.store.is_empty());
    assert!(app.state.handshakes().is_empty().await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health() {
    let app = spawn_app().await;
    let response = app.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}
