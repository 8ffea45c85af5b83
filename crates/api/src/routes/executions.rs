//! Execution lifecycle control routes.
//!
//! Thin HTTP boundary over the orchestrator: each handler validates the
//! request, delegates, and returns the affected row. Batch/job CRUD lives
//! with the ingestion layer, not here.

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use siphon_core::types::DbId;
use siphon_db::models::event::StoredEvent;
use siphon_db::models::execution::Execution;
use siphon_db::repositories::{EventRepo, ExecutionRepo, JobRepo};
use siphon_engine::TaskConfig;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Maximum page size for event history queries.
const MAX_EVENT_LIMIT: i64 = 500;

/// Default page size for event history queries.
const DEFAULT_EVENT_LIMIT: i64 = 100;

async fn load_execution(state: &AppState, id: DbId) -> AppResult<Execution> {
    ExecutionRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::NotFound {
            entity: "execution",
            id,
        })
}

/// GET /executions/{id} -- execution detail with live counters.
async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Execution>>> {
    let execution = load_execution(&state, id).await?;
    Ok(Json(DataResponse { data: execution }))
}

/// POST /executions/{id}/start -- flip to running and process the batch
/// in the background.
async fn start_execution(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Execution>>> {
    let mut execution = state.orchestrator.start(id).await?;

    // Executions seeded without an explicit limit fall back to the
    // configured default.
    if execution.concurrency < 1 {
        state
            .orchestrator
            .update_concurrency(id, state.config.default_concurrency)
            .await?;
        execution = load_execution(&state, id).await?;
    }

    let jobs = JobRepo::list_unsettled_for_batch(&state.pool, execution.batch_id).await?;
    let config = TaskConfig::new(state.config.retry_preset.config());
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(id, jobs, config).await {
            tracing::error!(execution_id = id, error = %e, "Execution run failed");
        }
    });

    Ok(Json(DataResponse { data: execution }))
}

/// POST /executions/{id}/pause -- stop admitting new jobs.
async fn pause_execution(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Execution>>> {
    state.orchestrator.pause(id).await?;
    let execution = load_execution(&state, id).await?;
    Ok(Json(DataResponse { data: execution }))
}

/// Response payload for a resume call.
#[derive(Serialize)]
pub struct ResumeResponse {
    /// Number of jobs re-queued by this resume.
    pub resumed_jobs: usize,
}

/// POST /executions/{id}/resume -- re-queue leftover jobs and continue.
///
/// Returns immediately with the resumed-job count; processing happens in
/// the background.
async fn resume_execution(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ResumeResponse>>> {
    let config = TaskConfig::new(state.config.retry_preset.config());
    let resumed_jobs = state.orchestrator.resume(id, config).await?;
    Ok(Json(DataResponse {
        data: ResumeResponse { resumed_jobs },
    }))
}

/// POST /executions/{id}/stop -- terminal stop.
async fn stop_execution(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Execution>>> {
    state.orchestrator.stop(id).await?;
    let execution = load_execution(&state, id).await?;
    Ok(Json(DataResponse { data: execution }))
}

/// Request payload for a concurrency resize.
#[derive(Deserialize)]
pub struct UpdateConcurrency {
    pub concurrency: i32,
}

/// PATCH /executions/{id}/concurrency -- resize the parallelism ceiling,
/// applied immediately to a run in flight.
async fn update_concurrency(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateConcurrency>,
) -> AppResult<Json<DataResponse<Execution>>> {
    state
        .orchestrator
        .update_concurrency(id, input.concurrency)
        .await?;
    let execution = load_execution(&state, id).await?;
    Ok(Json(DataResponse { data: execution }))
}

/// Query parameters for the event history listing.
#[derive(Deserialize)]
pub struct EventListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /executions/{id}/events -- durable event history, newest first.
async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(params): Query<EventListQuery>,
) -> AppResult<Json<DataResponse<Vec<StoredEvent>>>> {
    let limit = params.limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let events = EventRepo::list_for_execution(&state.pool, id, limit, offset).await?;
    Ok(Json(DataResponse { data: events }))
}

/// Mount the execution control routes (intended for `/api/v1/executions`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_execution))
        .route("/{id}/start", post(start_execution))
        .route("/{id}/pause", post(pause_execution))
        .route("/{id}/resume", post(resume_execution))
        .route("/{id}/stop", post(stop_execution))
        .route("/{id}/concurrency", patch(update_concurrency))
        .route("/{id}/events", get(list_events))
}
