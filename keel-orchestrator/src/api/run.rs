//! Run API Handlers
//!
//! Read-only views of pipeline runs and their logs.

use axum::{
    Json,
    extract::{Path, State},
};
use keel_core::domain::log::LogEntry;
use keel_core::domain::run::PipelineRun;
use keel_core::dto::run::RunSummary;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /runs
/// List all runs, oldest first
pub async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    tracing::debug!("Listing runs");

    let runs = state.orchestrator.store().list().await;
    Json(runs.iter().map(RunSummary::from).collect())
}

/// GET /runs/{id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::debug!("Getting run: {}", id);

    state
        .orchestrator
        .store()
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", id)))
}

/// GET /runs/{id}/logs
pub async fn get_run_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    state
        .orchestrator
        .store()
        .logs(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", id)))
}
