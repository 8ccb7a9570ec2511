//! Callback state machine
//!
//! `Processing → Success | Error`, both terminal. Validation order:
//!
//! 1. provider `error` parameter → [`OAuthError::ProviderDenied`]
//! 2. missing `code` or `state` → [`OAuthError::MalformedCallback`]
//! 3. no binding cookie → [`OAuthError::HandshakeExpiredOrMissing`]
//! 4. binding cookie ≠ `state` → [`OAuthError::CsrfValidationFailed`]
//! 5. no live handshake for `state` → [`OAuthError::HandshakeExpiredOrMissing`]
//! 6. identity policy
//! 7. token exchange and upsert
//!
//! Steps 3 and 4 are downgraded to warnings in lenient mode. The handshake is
//! removed at step 5 and never restored, so a failed exchange requires a new
//! authorization attempt.

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use super::agent::{ConsumeOutcome, HandshakeStore};
use super::refresh::TokenService;
use super::types::{CodeExchangeRequest, ConnectionStatus, OAuthError, OAuthHandshake};
use crate::config::{IdentityPolicy, StateValidation};
use crate::observability::{redact, redact_opt};

/// Query parameters delivered by the provider redirect
#[derive(Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// Echoed state
    pub state: Option<String>,
    /// Provider error code
    pub error: Option<String>,
    /// Provider error description
    pub error_description: Option<String>,
}

impl fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &redact_opt(self.code.as_deref()))
            .field("state", &redact_opt(self.state.as_deref()))
            .field("error", &self.error)
            .field("error_description", &self.error_description)
            .finish()
    }
}

/// Successful callback outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackSuccess {
    /// Same-origin path to send the user to
    pub redirect_to: String,
    /// Non-secret metadata of the stored connection
    pub status: ConnectionStatus,
}

/// Callback state machine states
#[derive(Debug)]
pub enum CallbackState {
    /// Validation and exchange in progress
    Processing,
    /// Tokens stored (terminal)
    Success(CallbackSuccess),
    /// Flow aborted (terminal)
    Error(OAuthError),
}

impl CallbackState {
    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// Convert a terminal state into a `Result`
    ///
    /// # Errors
    ///
    /// Returns the terminal error, or [`OAuthError::HandshakeStore`] if the
    /// machine was still processing.
    pub fn into_result(self) -> Result<CallbackSuccess, OAuthError> {
        match self {
            Self::Success(success) => Ok(success),
            Self::Error(err) => Err(err),
            Self::Processing => Err(OAuthError::HandshakeStore(
                "callback did not reach a terminal state".to_string(),
            )),
        }
    }
}

/// Drives a provider callback to a terminal state
#[derive(Clone)]
pub struct CallbackProcessor {
    handshakes: HandshakeStore,
    tokens: Arc<TokenService>,
    redirect_uri: String,
    state_validation: StateValidation,
    identity_policy: IdentityPolicy,
}

impl fmt::Debug for CallbackProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackProcessor")
            .field("redirect_uri", &self.redirect_uri)
            .field("state_validation", &self.state_validation)
            .field("identity_policy", &self.identity_policy)
            .finish_non_exhaustive()
    }
}

impl CallbackProcessor {
    /// Create a processor
    #[must_use]
    pub const fn new(
        handshakes: HandshakeStore,
        tokens: Arc<TokenService>,
        redirect_uri: String,
        state_validation: StateValidation,
        identity_policy: IdentityPolicy,
    ) -> Self {
        Self {
            handshakes,
            tokens,
            redirect_uri,
            state_validation,
            identity_policy,
        }
    }

    /// Process a callback
    ///
    /// `bound_state` is the state carried by this browser's binding cookie;
    /// `session_user` is the authenticated user completing the flow, if any.
    pub async fn process(
        &self,
        params: CallbackParams,
        bound_state: Option<&str>,
        session_user: Option<&str>,
    ) -> CallbackState {
        tracing::debug!(params = ?params, state = ?CallbackState::Processing, "OAuth callback received");

        match self.run(params, bound_state, session_user).await {
            Ok(success) => {
                tracing::info!(
                    provider = %success.status.provider,
                    redirect_to = %success.redirect_to,
                    "OAuth callback completed"
                );
                CallbackState::Success(success)
            }
            Err(err) => {
                tracing::info!(kind = err.kind(), error = %err, "OAuth callback failed");
                CallbackState::Error(err)
            }
        }
    }

    async fn run(
        &self,
        params: CallbackParams,
        bound_state: Option<&str>,
        session_user: Option<&str>,
    ) -> Result<CallbackSuccess, OAuthError> {
        if let Some(error) = params.error {
            self.discard(params.state.as_deref(), bound_state).await;
            return Err(OAuthError::ProviderDenied {
                error,
                description: params.error_description,
            });
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or(OAuthError::MalformedCallback("missing code"))?;
        let state = params
            .state
            .filter(|s| !s.is_empty())
            .ok_or(OAuthError::MalformedCallback("missing state"))?;

        self.check_binding(&state, bound_state)?;
        let handshake = self.take_handshake(&state).await?;
        let user_id = self.resolve_identity(&handshake, session_user)?;

        let record = self
            .tokens
            .connect(&CodeExchangeRequest {
                code,
                redirect_uri: self.redirect_uri.clone(),
                code_verifier: handshake.code_verifier.clone(),
                state,
                user_id,
            })
            .await?;

        Ok(CallbackSuccess {
            redirect_to: handshake.redirect_back_path,
            status: ConnectionStatus::from(&record),
        })
    }

    fn check_binding(&self, state: &str, bound_state: Option<&str>) -> Result<(), OAuthError> {
        let lenient = self.state_validation == StateValidation::Lenient;
        match bound_state {
            None if lenient => {
                tracing::warn!(
                    state = %redact(state),
                    "OAuth binding cookie missing; continuing in lenient mode"
                );
                Ok(())
            }
            None => Err(OAuthError::HandshakeExpiredOrMissing),
            Some(bound) if bound == state => Ok(()),
            Some(bound) => {
                tracing::warn!(
                    security_event = "oauth_csrf_state_mismatch",
                    received = %redact(state),
                    expected = %redact(bound),
                    lenient = lenient,
                    "OAuth state does not match the state this browser initiated"
                );
                if lenient {
                    Ok(())
                } else {
                    Err(OAuthError::CsrfValidationFailed)
                }
            }
        }
    }

    async fn take_handshake(&self, state: &str) -> Result<OAuthHandshake, OAuthError> {
        match self.handshakes.consume(state).await? {
            ConsumeOutcome::Consumed(handshake) => Ok(*handshake),
            ConsumeOutcome::Expired | ConsumeOutcome::Missing => {
                Err(OAuthError::HandshakeExpiredOrMissing)
            }
        }
    }

    fn resolve_identity(
        &self,
        handshake: &OAuthHandshake,
        session_user: Option<&str>,
    ) -> Result<String, OAuthError> {
        if let (Some(session), Some(initiator)) = (session_user, handshake.user_id.as_deref()) {
            if session != initiator {
                tracing::warn!(
                    security_event = "oauth_identity_mismatch",
                    session_user = %session,
                    initiating_user = %initiator,
                    policy = ?self.identity_policy,
                    "OAuth callback completed by a different user"
                );
                if self.identity_policy == IdentityPolicy::RequireSession {
                    return Err(OAuthError::IdentityMismatch);
                }
            }
        }

        match (self.identity_policy, session_user) {
            (_, Some(session)) => Ok(session.to_string()),
            (IdentityPolicy::RequireSession, None) => Err(OAuthError::Unauthenticated),
            (IdentityPolicy::PreferSession, None) => handshake
                .user_id
                .clone()
                .ok_or(OAuthError::Unauthenticated),
        }
    }

    /// Drop the handshake after a provider denial so it cannot be replayed
    async fn discard(&self, state: Option<&str>, bound_state: Option<&str>) {
        let Some(state) = state else { return };
        if bound_state != Some(state) {
            return;
        }
        if let Err(err) = self.handshakes.consume(state).await {
            tracing::debug!(error = %err, "Could not discard OAuth handshake");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2::exchange::MockTokenExchanger;
    use crate::oauth2::pkce;
    use crate::oauth2::store::{MemoryTokenStore, TokenStore};
    use crate::oauth2::types::ProviderTokens;
    use acton_reactive::prelude::*;
    use chrono::{Duration, Utc};

    const REDIRECT_URI: &str = "https://app.example.com/oauth/callback";

    struct Harness {
        _runtime: ActorRuntime,
        handshakes: HandshakeStore,
        store: Arc<MemoryTokenStore>,
        processor: CallbackProcessor,
    }

    async fn harness(
        exchanger: MockTokenExchanger,
        validation: StateValidation,
        policy: IdentityPolicy,
    ) -> Harness {
        let mut runtime = ActonApp::launch_async().await;
        let handshakes = HandshakeStore::spawn(&mut runtime, std::time::Duration::from_secs(300))
            .await
            .unwrap();
        let store = Arc::new(MemoryTokenStore::new());
        let tokens = Arc::new(TokenService::new(store.clone(), Arc::new(exchanger), "zoom"));
        let processor = CallbackProcessor::new(
            handshakes.clone(),
            tokens,
            REDIRECT_URI.to_string(),
            validation,
            policy,
        );
        Harness {
            _runtime: runtime,
            handshakes,
            store,
            processor,
        }
    }

    fn params(code: &str, state: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..CallbackParams::default()
        }
    }

    fn exchanging_mock() -> MockTokenExchanger {
        let mut exchanger = MockTokenExchanger::new();
        exchanger
            .expect_exchange_code()
            .withf(|request| {
                request.code == "abc"
                    && request.user_id == "u1"
                    && request.redirect_uri == REDIRECT_URI
                    && request.code_verifier.is_some()
            })
            .times(1)
            .returning(|_| {
                Ok(ProviderTokens {
                    access_token: "AT1".to_string(),
                    token_type: Some("bearer".to_string()),
                    refresh_token: Some("RT1".to_string()),
                    expires_in: Some(3600),
                    scope: None,
                })
            });
        exchanger
    }

    fn never_exchanging_mock() -> MockTokenExchanger {
        let mut exchanger = MockTokenExchanger::new();
        exchanger.expect_exchange_code().times(0);
        exchanger
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_successful_callback_stores_tokens() {
        let h = harness(exchanging_mock(), StateValidation::Strict, IdentityPolicy::RequireSession)
            .await;
        let handshake = h
            .handshakes
            .begin(Some("u1".into()), "/notes".into(), true)
            .await
            .unwrap();

        let success = h
            .processor
            .process(params("abc", &handshake.state), Some(&handshake.state), Some("u1"))
            .await
            .into_result()
            .unwrap();

        assert_eq!(success.redirect_to, "/notes");
        assert!(success.status.connected);
        let record = h.store.find("u1", "zoom").await.unwrap().unwrap();
        assert_eq!(record.access_token, "AT1");
        let drift = (record.expires_at - (Utc::now() + Duration::seconds(3600))).num_seconds();
        assert!(drift.abs() <= 5);
        assert!(h.handshakes.is_empty().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_provider_error_is_surfaced_verbatim() {
        let h = harness(
            never_exchanging_mock(),
            StateValidation::Strict,
            IdentityPolicy::RequireSession,
        )
        .await;
        let handshake = h.handshakes.begin(None, "/".into(), true).await.unwrap();

        let callback = CallbackParams {
            state: Some(handshake.state.clone()),
            error: Some("access_denied".to_string()),
            error_description: Some("The user denied access".to_string()),
            ..CallbackParams::default()
        };
        let err = h
            .processor
            .process(callback, Some(&handshake.state), Some("u1"))
            .await
            .into_result()
            .unwrap_err();

        assert_eq!(err.user_message(), "The user denied access");
        assert!(h.handshakes.is_empty().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_code_is_malformed() {
        let h = harness(
            never_exchanging_mock(),
            StateValidation::Strict,
            IdentityPolicy::RequireSession,
        )
        .await;
        let callback = CallbackParams {
            state: Some("s".to_string()),
            ..CallbackParams::default()
        };
        let err = h
            .processor
            .process(callback, Some("s"), Some("u1"))
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(err, OAuthError::MalformedCallback(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_forged_state_fails_csrf_without_exchange() {
        let h = harness(
            never_exchanging_mock(),
            StateValidation::Strict,
            IdentityPolicy::RequireSession,
        )
        .await;
        let handshake = h
            .handshakes
            .begin(Some("u1".into()), "/".into(), true)
            .await
            .unwrap();

        let err = h
            .processor
            .process(params("abc", "forged-state"), Some(&handshake.state), Some("u1"))
            .await
            .into_result()
            .unwrap_err();

        assert!(matches!(err, OAuthError::CsrfValidationFailed));
        // The legitimate handshake survives a forged callback
        assert_eq!(h.handshakes.len().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_binding_cookie() {
        let h = harness(
            never_exchanging_mock(),
            StateValidation::Strict,
            IdentityPolicy::RequireSession,
        )
        .await;
        let handshake = h.handshakes.begin(None, "/".into(), true).await.unwrap();

        let err = h
            .processor
            .process(params("abc", &handshake.state), None, Some("u1"))
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(err, OAuthError::HandshakeExpiredOrMissing));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replayed_state_is_expired_or_missing() {
        let h = harness(exchanging_mock(), StateValidation::Strict, IdentityPolicy::RequireSession)
            .await;
        let handshake = h
            .handshakes
            .begin(Some("u1".into()), "/".into(), true)
            .await
            .unwrap();
        let state = handshake.state.as_str();

        h.processor
            .process(params("abc", state), Some(state), Some("u1"))
            .await
            .into_result()
            .unwrap();

        let err = h
            .processor
            .process(params("abc", state), Some(state), Some("u1"))
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(err, OAuthError::HandshakeExpiredOrMissing));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_expired_handshake_rejected() {
        let h = harness(
            never_exchanging_mock(),
            StateValidation::Strict,
            IdentityPolicy::RequireSession,
        )
        .await;
        let mut handshake = pkce::begin_handshake(Some("u1".into()), "/".into(), true).unwrap();
        handshake.created_at = Utc::now() - Duration::seconds(301);
        h.handshakes.insert(handshake.clone()).await.unwrap();

        let err = h
            .processor
            .process(params("abc", &handshake.state), Some(&handshake.state), Some("u1"))
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(err, OAuthError::HandshakeExpiredOrMissing));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_lenient_mode_tolerates_missing_cookie() {
        let h = harness(exchanging_mock(), StateValidation::Lenient, IdentityPolicy::RequireSession)
            .await;
        let handshake = h
            .handshakes
            .begin(Some("u1".into()), "/".into(), true)
            .await
            .unwrap();

        let result = h
            .processor
            .process(params("abc", &handshake.state), None, Some("u1"))
            .await
            .into_result();
        assert!(result.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_require_session_rejects_anonymous_callback() {
        let h = harness(
            never_exchanging_mock(),
            StateValidation::Strict,
            IdentityPolicy::RequireSession,
        )
        .await;
        let handshake = h
            .handshakes
            .begin(Some("u1".into()), "/".into(), true)
            .await
            .unwrap();

        let err = h
            .processor
            .process(params("abc", &handshake.state), Some(&handshake.state), None)
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(err, OAuthError::Unauthenticated));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prefer_session_falls_back_to_handshake_user() {
        let h = harness(exchanging_mock(), StateValidation::Strict, IdentityPolicy::PreferSession)
            .await;
        let handshake = h
            .handshakes
            .begin(Some("u1".into()), "/".into(), true)
            .await
            .unwrap();

        let result = h
            .processor
            .process(params("abc", &handshake.state), Some(&handshake.state), None)
            .await
            .into_result();
        assert!(result.is_ok());
        assert!(h.store.find("u1", "zoom").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_identity_mismatch_rejected() {
        let h = harness(
            never_exchanging_mock(),
            StateValidation::Strict,
            IdentityPolicy::RequireSession,
        )
        .await;
        let handshake = h
            .handshakes
            .begin(Some("u1".into()), "/".into(), true)
            .await
            .unwrap();

        let err = h
            .processor
            .process(params("abc", &handshake.state), Some(&handshake.state), Some("u2"))
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(err, OAuthError::IdentityMismatch));
        assert!(h.store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prefer_session_stores_tokens_for_session_user_on_mismatch() {
        let mut exchanger = MockTokenExchanger::new();
        exchanger
            .expect_exchange_code()
            .withf(|request| request.user_id == "u2")
            .times(1)
            .returning(|_| {
                Ok(ProviderTokens {
                    access_token: "AT1".to_string(),
                    token_type: Some("bearer".to_string()),
                    refresh_token: Some("RT1".to_string()),
                    expires_in: Some(3600),
                    scope: None,
                })
            });
        let h = harness(exchanger, StateValidation::Strict, IdentityPolicy::PreferSession).await;
        let handshake = h
            .handshakes
            .begin(Some("u1".into()), "/".into(), true)
            .await
            .unwrap();

        let result = h
            .processor
            .process(params("abc", &handshake.state), Some(&handshake.state), Some("u2"))
            .await
            .into_result();

        assert!(result.is_ok());
        assert!(h.store.find("u2", "zoom").await.unwrap().is_some());
        assert!(h.store.find("u1", "zoom").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exchange_failure_keeps_handshake_consumed() {
        let mut exchanger = MockTokenExchanger::new();
        exchanger
            .expect_exchange_code()
            .times(1)
            .returning(|_| Err(OAuthError::UpstreamUnreachable("timed out".to_string())));
        let h = harness(exchanger, StateValidation::Strict, IdentityPolicy::RequireSession).await;
        let handshake = h
            .handshakes
            .begin(Some("u1".into()), "/".into(), true)
            .await
            .unwrap();

        let err = h
            .processor
            .process(params("abc", &handshake.state), Some(&handshake.state), Some("u1"))
            .await
            .into_result()
            .unwrap_err();

        assert!(err.is_upstream_failure());
        assert!(h.handshakes.is_empty().await.unwrap());
        assert!(h.store.is_empty());
    }
}
