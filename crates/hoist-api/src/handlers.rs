//! Admin API handlers.
//!
//! Triggers go through the `Scheduler` admin helpers; views read its
//! snapshots. Everything answers with the `ApiResponse` envelope.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use hoist_core::{Labels, TaskInfo};
use hoist_scheduler::{SchedulerError, SchedulerResult};

use crate::ApiState;

const USAGE: &str = "\
hoist admin

  GET /create/{name}                  run a new container
  GET /checkpoint/{name}              checkpoint a container on its current host
  GET /restore/{name}/{target_host}   restore a checkpointed container
  GET /logs/{name}                    fetch logs from a container's host
  GET /selftest/{name}                run the self-test workload

  POST /api/v1/tasks                  enqueue a raw label map
  GET  /api/v1/queue                  pending operations
  GET  /api/v1/placements             container placements
  GET  /api/v1/logs/{name}            last fetched logs
  GET  /api/v1/stats                  scheduler counters
";

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Status code for a refused admin trigger.
fn error_status(err: &SchedulerError) -> StatusCode {
    match err {
        SchedulerError::AlreadyPlaced { .. }
        | SchedulerError::LaunchPending { .. }
        | SchedulerError::NotPlaced(_) => StatusCode::CONFLICT,
        SchedulerError::MalformedStatus { .. } => StatusCode::BAD_REQUEST,
    }
}

/// Answer a trigger with the queue as it stands after the enqueue.
async fn queued(state: &ApiState, result: SchedulerResult<TaskInfo>) -> axum::response::Response {
    match result {
        Ok(task) => {
            let queue = state.scheduler.queue_snapshot().await;
            info!(task = %task.task_id, pending = queue.len(), "operation queued");
            (StatusCode::ACCEPTED, ApiResponse::ok(queue)).into_response()
        }
        Err(e) => error_response(&e.to_string(), error_status(&e)).into_response(),
    }
}

// ── Triggers ───────────────────────────────────────────────────

/// GET /
pub async fn usage() -> &'static str {
    USAGE
}

/// GET /create/{name}
pub async fn create(State(state): State<ApiState>, Path(name): Path<String>) -> impl IntoResponse {
    let result = state.scheduler.run_container(&name).await;
    queued(&state, result).await
}

/// GET /checkpoint/{name}
pub async fn checkpoint(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let result = state.scheduler.checkpoint_container(&name).await;
    queued(&state, result).await
}

/// GET /restore/{name}/{target_host}
pub async fn restore(
    State(state): State<ApiState>,
    Path((name, target_host)): Path<(String, String)>,
) -> impl IntoResponse {
    let task = state.scheduler.restore_container(&name, &target_host).await;
    queued(&state, Ok(task)).await
}

/// GET /logs/{name}
pub async fn logs(State(state): State<ApiState>, Path(name): Path<String>) -> impl IntoResponse {
    let result = state.scheduler.get_logs(&name).await;
    queued(&state, result).await
}

/// GET /selftest/{name}
pub async fn selftest(State(state): State<ApiState>, Path(name): Path<String>) -> impl IntoResponse {
    let task = state.scheduler.self_test(&name).await;
    queued(&state, Ok(task)).await
}

/// POST /api/v1/tasks
///
/// The label map is queued as-is; a malformed set is discarded at
/// matching time.
pub async fn enqueue_raw(
    State(state): State<ApiState>,
    Json(labels): Json<BTreeMap<String, String>>,
) -> impl IntoResponse {
    if labels.is_empty() {
        return error_response("empty label set", StatusCode::BAD_REQUEST).into_response();
    }
    let task = state
        .scheduler
        .enqueue_labels(labels.into_iter().collect::<Labels>())
        .await;
    (StatusCode::CREATED, ApiResponse::ok(task)).into_response()
}

// ── Views ──────────────────────────────────────────────────────

/// GET /api/v1/queue
pub async fn list_queue(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.scheduler.queue_snapshot().await)
}

/// GET /api/v1/placements
pub async fn list_placements(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.scheduler.placements().await)
}

/// GET /api/v1/logs/{name}
pub async fn get_logs(State(state): State<ApiState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.scheduler.logs(&name).await {
        Some(output) => ApiResponse::ok(output).into_response(),
        None => error_response("no logs collected", StatusCode::NOT_FOUND).into_response(),
    }
}

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.scheduler.stats().await)
}
