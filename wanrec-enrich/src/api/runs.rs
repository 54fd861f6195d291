//! Reconciliation run control
//!
//! POST starts a run in the background and returns immediately; progress is
//! observable through `GET /runs/latest` and `GET /health`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ReconSettings;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::RunReport;
use crate::services::ReconciliationOrchestrator;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RunStartedResponse {
    pub run_id: Uuid,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct RunCancelledResponse {
    pub run_id: Uuid,
    pub cancelled: bool,
}

/// POST /runs
pub async fn start_run(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<RunStartedResponse>)> {
    let settings = ReconSettings::resolve(&state.db, &state.toml_config).await?;
    let orchestrator = ReconciliationOrchestrator::with_default_clients(state.db.clone(), settings)?;
    start_with(state, orchestrator).await
}

/// Claim the run slot and spawn `orchestrator` on it
pub async fn start_with(
    state: AppState,
    orchestrator: ReconciliationOrchestrator,
) -> ApiResult<(StatusCode, Json<RunStartedResponse>)> {
    let run = state.begin_run().await?;
    let run_id = run.run_id;
    info!(%run_id, "Reconciliation run requested");

    tokio::spawn(async move {
        let outcome = orchestrator.run(run.run_id, run.cancel.clone()).await;
        if let Err(e) = outcome {
            error!(run_id = %run.run_id, "Run failed: {}", e);
            *state.last_error.write().await = Some(e.to_string());
        }
        state.end_run(run.run_id).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunStartedResponse {
            run_id,
            state: "RUNNING".to_string(),
        }),
    ))
}

/// DELETE /runs/current
pub async fn cancel_run(State(state): State<AppState>) -> ApiResult<Json<RunCancelledResponse>> {
    let current = state.current_run.read().await.clone();
    match current {
        Some(run) => {
            info!(run_id = %run.run_id, "Cancelling reconciliation run");
            run.cancel.cancel();
            Ok(Json(RunCancelledResponse {
                run_id: run.run_id,
                cancelled: true,
            }))
        }
        None => Err(ApiError::NotFound("No reconciliation run in progress".to_string())),
    }
}

/// GET /runs/latest
pub async fn latest_run(State(state): State<AppState>) -> ApiResult<Json<RunReport>> {
    db::runs::latest_report(&state.db)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No reconciliation runs recorded".to_string()))
}

pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/runs", post(start_run))
        .route("/runs/current", delete(cancel_run))
        .route("/runs/latest", get(latest_run))
}
