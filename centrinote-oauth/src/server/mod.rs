//! HTTP server assembly

use acton_reactive::prelude::*;
use axum::Router;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::config::CentrinoteConfig;
use crate::oauth2::{handlers, HandshakeStore};
use crate::state::AppState;
use crate::health;

/// Build the full router for a state
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(handlers::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically purge expired handshakes
///
/// Runs until the runtime shuts down.
pub fn spawn_handshake_sweeper(handshakes: HandshakeStore, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            handshakes.cleanup().await;
        }
    })
}

/// Run the service until Ctrl-C
///
/// # Errors
///
/// Returns error if the state cannot be built, the address cannot be bound,
/// or the server fails
pub async fn serve(config: CentrinoteConfig) -> anyhow::Result<()> {
    let mut runtime = ActonApp::launch_async().await;
    let state = AppState::from_config(&mut runtime, config).await?;

    let sweeper = spawn_handshake_sweeper(
        state.handshakes().clone(),
        state.config().security.handshake_ttl(),
    );

    let addr = format!(
        "{}:{}",
        state.config().service.host,
        state.config().service.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        address = %addr,
        provider = %state.config().oauth.provider,
        environment = ?state.config().service.environment,
        "Starting OAuth service"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    sweeper.abort();
    runtime.shutdown_all().await?;
    Ok(())
}
