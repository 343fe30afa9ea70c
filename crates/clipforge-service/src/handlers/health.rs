//! Health check handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Whether render jobs can be created.
    pub renders_enabled: bool,
    /// Whether customization uploads are accepted.
    pub uploads_enabled: bool,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "clipforge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        renders_enabled: state.has_renders(),
        uploads_enabled: state.storage.is_some(),
    })
}
