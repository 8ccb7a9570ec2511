//! Liveness endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct Health {
    /// Always `"ok"` when the process can answer
    pub status: &'static str,
    /// Service name
    pub service: String,
    /// Crate version
    pub version: &'static str,
}

/// Health routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        service: state.config().service.name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
