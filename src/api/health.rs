//! Health check endpoint handler.

use crate::api::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    /// Name of the configured completion source.
    pub source: String,
}

/// GET /health - Return liveness and the active completion source.
pub async fn handle(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        source: state.source.name().to_string(),
    })
}
