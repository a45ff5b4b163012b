use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ferry_common::{
    PortAllocated, PortDeallocation, PortRelease, PortRequest, PortsReleased, RunRegistered,
    RunSubmission,
};
use tracing::debug;

use super::runs::{RunError, RunRegistry};
use crate::errors::PortError;
use crate::ports::PortAllocator;

// ── Shared worker state ───────────────────────────────────────────────

pub struct WorkerState {
    pub runs: Arc<RunRegistry>,
    /// One table for the life of the worker process
    pub ports: PortAllocator,
}

pub type SharedState = Arc<WorkerState>;

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RunError::InvalidState { .. } => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<PortError> for ApiError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Exhausted { .. } => ApiError::Conflict(err.to_string()),
            PortError::LockPoisoned => ApiError::Internal(err.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/runs", post(register_run))
        .route("/runs/{id}", get(run_status))
        .route("/runs/{id}/prepare", post(prepare_run))
        .route("/runs/{id}/start", post(start_run))
        .route("/runs/{id}/stop", post(stop_run))
        .route("/runs/{id}/cleanup", post(cleanup_run))
        .route("/ports/allocate", post(allocate_port))
        .route("/ports/deallocate", post(deallocate_port))
        .route("/ports/release", post(release_ports))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "runs": state.runs.len()}))
}

async fn register_run(
    State(state): State<SharedState>,
    Json(submission): Json<RunSubmission>,
) -> impl IntoResponse {
    let run_id = state.runs.register(submission);
    (StatusCode::CREATED, Json(RunRegistered { run_id }))
}

async fn run_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.runs.status(&id)?))
}

async fn prepare_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.runs.prepare(&id)?))
}

async fn start_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.runs.start(&id)?))
}

async fn stop_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.runs.stop(&id)?))
}

async fn cleanup_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.runs.cleanup(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn allocate_port(
    State(state): State<SharedState>,
    Json(request): Json<PortRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let port = state.ports.allocate(&request)?;
    Ok(Json(PortAllocated { port }))
}

async fn deallocate_port(
    State(state): State<SharedState>,
    Json(request): Json<PortDeallocation>,
) -> Result<impl IntoResponse, ApiError> {
    if state.ports.deallocate(&request.host, request.port)?.is_none() {
        debug!(host = %request.host, port = request.port, "Deallocated unknown port");
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn release_ports(
    State(state): State<SharedState>,
    Json(request): Json<PortRelease>,
) -> Result<impl IntoResponse, ApiError> {
    let released = state.ports.release_pipeline(&request.pipeline_name)?;
    Ok(Json(PortsReleased { released }))
}
