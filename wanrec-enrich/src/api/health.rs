//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "running" while a reconciliation run is active
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_run: Option<Uuid>,
    /// Last run failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;
    let current_run = state.current_run.read().await.as_ref().map(|r| r.run_id);
    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if current_run.is_some() { "running" } else { "ok" }.to_string(),
        module: "wanrec-enrich".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        current_run,
        last_error,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
