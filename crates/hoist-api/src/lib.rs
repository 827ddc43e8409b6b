//! hoist-api — admin HTTP surface for Hoist.
//!
//! Operators trigger migrations here; every trigger enqueues one operation
//! and answers with the pending queue as it stands afterwards.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Usage text |
//! | GET | `/create/{name}` | Enqueue a RUN_CONTAINER |
//! | GET | `/checkpoint/{name}` | Enqueue a CHECKPOINT_CONTAINER on the current host |
//! | GET | `/restore/{name}/{target_host}` | Enqueue a RESTORE_CONTAINER |
//! | GET | `/logs/{name}` | Enqueue a GET_LOGS on the current host |
//! | GET | `/selftest/{name}` | Enqueue a TEST_TASK |
//! | POST | `/api/v1/tasks` | Enqueue a raw label map |
//! | GET | `/api/v1/queue` | Pending queue, oldest first |
//! | GET | `/api/v1/placements` | Container → host table |
//! | GET | `/api/v1/logs/{name}` | Last collected log output |
//! | GET | `/api/v1/stats` | Scheduler counters |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use hoist_scheduler::Scheduler;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Scheduler,
}

/// Build the complete admin router.
pub fn build_router(scheduler: Scheduler) -> Router {
    let state = ApiState { scheduler };

    let api_routes = Router::new()
        .route("/tasks", post(handlers::enqueue_raw))
        .route("/queue", get(handlers::list_queue))
        .route("/placements", get(handlers::list_placements))
        .route("/logs/{name}", get(handlers::get_logs))
        .route("/stats", get(handlers::get_stats))
        .with_state(state.clone());

    Router::new()
        .route("/", get(handlers::usage))
        .route("/create/{name}", get(handlers::create))
        .route("/checkpoint/{name}", get(handlers::checkpoint))
        .route("/restore/{name}/{target_host}", get(handlers::restore))
        .route("/logs/{name}", get(handlers::logs))
        .route("/selftest/{name}", get(handlers::selftest))
        .with_state(state)
        .nest("/api/v1", api_routes)
}
