//! Read access to enriched circuit records

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::EnrichedCircuitRecord;
use crate::AppState;

/// GET /enriched
pub async fn list_enriched(State(state): State<AppState>) -> ApiResult<Json<Vec<EnrichedCircuitRecord>>> {
    let records = db::enriched::load_all(&state.db).await?;
    Ok(Json(records))
}

/// GET /enriched/:network_name
pub async fn get_enriched(
    State(state): State<AppState>,
    Path(network_name): Path<String>,
) -> ApiResult<Json<EnrichedCircuitRecord>> {
    db::enriched::load_one(&state.db, &network_name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No enriched record for '{}'", network_name)))
}

pub fn enriched_routes() -> Router<AppState> {
    Router::new()
        .route("/enriched", get(list_enriched))
        .route("/enriched/:network_name", get(get_enriched))
}
