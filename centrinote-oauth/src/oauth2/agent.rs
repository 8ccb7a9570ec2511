//! Handshake store agent
//!
//! Pending handshakes live in a single acton-reactive agent keyed by `state`.
//! Handlers run one at a time, so "look up, check expiry, remove" in
//! [`ConsumeHandshake`] is atomic: two callbacks racing on the same `state`
//! can never both receive the handshake.

use acton_reactive::prelude::*;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

use super::pkce;
use super::types::{OAuthError, OAuthHandshake, DEFAULT_HANDSHAKE_TTL_SECS};
use crate::observability::redact;

/// Type alias for response channels (web handler pattern)
pub type ResponseChannel<T> = Arc<Mutex<Option<oneshot::Sender<T>>>>;

fn response_channel<T>() -> (ResponseChannel<T>, oneshot::Receiver<T>) {
    let (tx, rx) = oneshot::channel();
    (Arc::new(Mutex::new(Some(tx))), rx)
}

async fn reply<T>(response_tx: ResponseChannel<T>, value: T) {
    let tx = response_tx.lock().await.take();
    if let Some(tx) = tx {
        let _ = tx.send(value);
    }
}

/// Result of consuming a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The handshake was live and has now been removed
    Consumed(Box<OAuthHandshake>),
    /// A handshake existed but its TTL had passed (it has been removed)
    Expired,
    /// No handshake for this state (never created or already consumed)
    Missing,
}

/// Handshake store agent model
#[derive(Debug, Clone)]
pub struct HandshakeAgent {
    handshakes: HashMap<String, OAuthHandshake>,
    ttl: Duration,
}

impl Default for HandshakeAgent {
    fn default() -> Self {
        Self {
            handshakes: HashMap::new(),
            ttl: Duration::seconds(i64::try_from(DEFAULT_HANDSHAKE_TTL_SECS).unwrap_or(300)),
        }
    }
}

impl HandshakeAgent {
    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.handshakes.len();
        let ttl = self.ttl;
        self.handshakes
            .retain(|_, handshake| !handshake.is_expired_at(ttl, now));
        before - self.handshakes.len()
    }
}

/// Store a freshly created handshake
#[derive(Debug, Clone)]
pub struct StoreHandshake {
    /// Handshake to store
    pub handshake: OAuthHandshake,
    /// Acknowledgement channel
    pub response_tx: ResponseChannel<()>,
}

impl StoreHandshake {
    /// Create a store request with its acknowledgement receiver
    #[must_use]
    pub fn new(handshake: OAuthHandshake) -> (Self, oneshot::Receiver<()>) {
        let (response_tx, rx) = response_channel();
        (
            Self {
                handshake,
                response_tx,
            },
            rx,
        )
    }
}

/// Atomically validate and remove the handshake for a `state`
#[derive(Debug, Clone)]
pub struct ConsumeHandshake {
    /// Received state
    pub state: String,
    /// Response channel
    pub response_tx: ResponseChannel<ConsumeOutcome>,
}

impl ConsumeHandshake {
    /// Create a consume request with its response receiver
    #[must_use]
    pub fn new(state: String) -> (Self, oneshot::Receiver<ConsumeOutcome>) {
        let (response_tx, rx) = response_channel();
        (Self { state, response_tx }, rx)
    }
}

/// Count pending handshakes
#[derive(Debug, Clone)]
pub struct CountHandshakes {
    /// Response channel
    pub response_tx: ResponseChannel<usize>,
}

impl CountHandshakes {
    /// Create a count request with its response receiver
    #[must_use]
    pub fn new() -> (Self, oneshot::Receiver<usize>) {
        let (response_tx, rx) = response_channel();
        (Self { response_tx }, rx)
    }
}

/// Message to clean up expired handshakes
#[derive(Debug, Clone)]
pub struct CleanupExpired;

impl HandshakeAgent {
    /// Spawn the handshake store agent
    ///
    /// # Errors
    ///
    /// Returns error if agent configuration or spawning fails
    pub async fn spawn(runtime: &mut ActorRuntime, ttl: Duration) -> anyhow::Result<ActorHandle> {
        let config = ActorConfig::new(Ern::with_root("oauth_handshake_store")?, None, None)?;

        let mut builder = runtime.new_actor_with_config::<Self>(config);
        builder.model.ttl = ttl;

        builder
            .mutate_on::<StoreHandshake>(|agent, envelope| {
                let handshake = envelope.message().handshake.clone();
                let response_tx = envelope.message().response_tx.clone();

                agent.model.purge_expired(Utc::now());

                tracing::debug!(
                    state = %redact(&handshake.state),
                    user_id = ?handshake.user_id,
                    pkce = handshake.code_verifier.is_some(),
                    "Stored OAuth handshake"
                );
                agent
                    .model
                    .handshakes
                    .insert(handshake.state.clone(), handshake);

                Reply::pending(reply(response_tx, ()))
            })
            .mutate_on::<ConsumeHandshake>(|agent, envelope| {
                let state = envelope.message().state.clone();
                let response_tx = envelope.message().response_tx.clone();
                let now = Utc::now();
                let ttl = agent.model.ttl;

                let outcome = match agent.model.handshakes.remove(&state) {
                    Some(handshake) if handshake.is_expired_at(ttl, now) => {
                        tracing::debug!(state = %redact(&state), "OAuth handshake expired");
                        ConsumeOutcome::Expired
                    }
                    Some(handshake) => {
                        tracing::debug!(state = %redact(&state), "Consumed OAuth handshake");
                        ConsumeOutcome::Consumed(Box::new(handshake))
                    }
                    None => {
                        tracing::debug!(state = %redact(&state), "No OAuth handshake for state");
                        ConsumeOutcome::Missing
                    }
                };

                agent.model.purge_expired(now);

                Reply::pending(reply(response_tx, outcome))
            })
            .act_on::<CountHandshakes>(|agent, envelope| {
                let response_tx = envelope.message().response_tx.clone();
                let count = agent.model.handshakes.len();
                Reply::pending(reply(response_tx, count))
            })
            .mutate_on::<CleanupExpired>(|agent, _envelope| {
                let removed = agent.model.purge_expired(Utc::now());

                if removed > 0 {
                    tracing::debug!(
                        removed = removed,
                        remaining = agent.model.handshakes.len(),
                        "Cleaned up expired OAuth handshakes"
                    );
                }

                Reply::ready()
            })
            .after_start(|_agent| async {
                tracing::info!("OAuth handshake store agent started");
            })
            .after_stop(|agent| {
                let pending = agent.model.handshakes.len();
                async move {
                    tracing::info!(pending = pending, "OAuth handshake store agent stopped");
                }
            });

        Ok(builder.start().await)
    }
}

/// Handle to the handshake store used by the HTTP layer
#[derive(Clone)]
pub struct HandshakeStore {
    handle: ActorHandle,
    ttl: std::time::Duration,
}

impl fmt::Debug for HandshakeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl HandshakeStore {
    /// Spawn the backing agent with the given TTL
    ///
    /// # Errors
    ///
    /// Returns error if the TTL is out of range or the agent cannot be spawned
    pub async fn spawn(runtime: &mut ActorRuntime, ttl: std::time::Duration) -> anyhow::Result<Self> {
        let chrono_ttl = Duration::from_std(ttl)?;
        let handle = HandshakeAgent::spawn(runtime, chrono_ttl).await?;
        Ok(Self { handle, ttl })
    }

    /// Configured handshake lifetime
    #[must_use]
    pub const fn ttl(&self) -> std::time::Duration {
        self.ttl
    }

    /// Generate a handshake and persist it before the browser leaves
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::EntropyUnavailable`] or
    /// [`OAuthError::HandshakeStore`] if the agent does not acknowledge.
    pub async fn begin(
        &self,
        user_id: Option<String>,
        redirect_back_path: String,
        pkce_enabled: bool,
    ) -> Result<OAuthHandshake, OAuthError> {
        let handshake = pkce::begin_handshake(user_id, redirect_back_path, pkce_enabled)?;
        self.insert(handshake.clone()).await?;
        Ok(handshake)
    }

    /// Persist an existing handshake
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::HandshakeStore`] if the agent does not acknowledge.
    pub async fn insert(&self, handshake: OAuthHandshake) -> Result<(), OAuthError> {
        let (request, rx) = StoreHandshake::new(handshake);
        self.handle.send(request).await;
        rx.await
            .map_err(|_| OAuthError::HandshakeStore("store request dropped".to_string()))
    }

    /// Atomically take the handshake for `state`
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::HandshakeStore`] if the agent does not answer.
    pub async fn consume(&self, state: &str) -> Result<ConsumeOutcome, OAuthError> {
        let (request, rx) = ConsumeHandshake::new(state.to_string());
        self.handle.send(request).await;
        rx.await
            .map_err(|_| OAuthError::HandshakeStore("consume request dropped".to_string()))
    }

    /// Number of pending handshakes (expired entries not yet purged included)
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::HandshakeStore`] if the agent does not answer.
    pub async fn len(&self) -> Result<usize, OAuthError> {
        let (request, rx) = CountHandshakes::new();
        self.handle.send(request).await;
        rx.await
            .map_err(|_| OAuthError::HandshakeStore("count request dropped".to_string()))
    }

    /// Whether no handshakes are pending
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::HandshakeStore`] if the agent does not answer.
    pub async fn is_empty(&self) -> Result<bool, OAuthError> {
        Ok(self.len().await? == 0)
    }

    /// Ask the agent to purge expired handshakes
    pub async fn cleanup(&self) {
        self.handle.send(CleanupExpired).await;
    }
}
