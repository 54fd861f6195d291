//! wanrec-enrich library interface
//!
//! WAN circuit reconciliation: merges gateway telemetry, the authoritative
//! circuit feed and internet-registry lookups into one enriched record per
//! site. Exposed as a library for the binary and for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, ReconError};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wanrec_common::config::TomlConfig;

/// Run currently executing in this process
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub run_id: Uuid,
    pub cancel: CancellationToken,
    pub started_at: DateTime<Utc>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Bootstrap config; database settings are re-read per run
    pub toml_config: Arc<TomlConfig>,
    /// At most one reconciliation run per process
    pub current_run: Arc<RwLock<Option<ActiveRun>>>,
    pub startup_time: DateTime<Utc>,
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, toml_config: TomlConfig) -> Self {
        Self {
            db,
            toml_config: Arc::new(toml_config),
            current_run: Arc::new(RwLock::new(None)),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Claim the run slot, failing if a run is already active
    pub async fn begin_run(&self) -> Result<ActiveRun, ReconError> {
        let mut slot = self.current_run.write().await;
        if let Some(active) = slot.as_ref() {
            return Err(ReconError::AlreadyRunning(active.run_id));
        }
        let run = ActiveRun {
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
        };
        *slot = Some(run.clone());
        Ok(run)
    }

    /// Release the run slot if it still belongs to `run_id`
    pub async fn end_run(&self, run_id: Uuid) {
        let mut slot = self.current_run.write().await;
        if slot.as_ref().map(|r| r.run_id == run_id).unwrap_or(false) {
            *slot = None;
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::run_routes())
        .merge(api::enriched_routes())
        .merge(api::health_routes())
        .with_state(state)
}
