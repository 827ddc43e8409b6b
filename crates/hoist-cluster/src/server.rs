//! Cluster endpoints — scheduler side.
//!
//! Node agents POST offers and receive the tasks admitted against them in
//! the response; executors POST status updates back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{debug, warn};

use hoist_core::{Offer, TaskStatus};
use hoist_scheduler::Scheduler;

use crate::wire::{OFFERS_PATH, OfferRequest, OfferResponse, STATUS_PATH};

/// Shared state for the cluster endpoints.
#[derive(Clone)]
pub struct ClusterState {
    pub scheduler: Scheduler,
    next_offer: Arc<AtomicU64>,
}

impl ClusterState {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            next_offer: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Router serving the offer and status endpoints.
pub fn cluster_router(scheduler: Scheduler) -> Router {
    Router::new()
        .route(OFFERS_PATH, post(offer))
        .route(STATUS_PATH, post(status))
        .with_state(ClusterState::new(scheduler))
}

/// POST /cluster/v1/offers
async fn offer(State(state): State<ClusterState>, Json(req): Json<OfferRequest>) -> impl IntoResponse {
    if !req.is_valid() {
        warn!(host = %req.host, cpus = req.cpus, mem = req.mem, "rejecting invalid offer");
        return (StatusCode::BAD_REQUEST, "invalid offer").into_response();
    }

    let n = state.next_offer.fetch_add(1, Ordering::Relaxed);
    let offer = Offer {
        offer_id: format!("{}-O{n}", req.host),
        host: req.host.clone(),
        resources: req.resources(),
    };
    debug!(offer = %offer.offer_id, host = %offer.host, cpus = req.cpus, mem = req.mem, "offer received");

    let dispatch = state.scheduler.resource_offer(offer).await;
    Json(OfferResponse {
        offer_id: dispatch.offer_id,
        tasks: dispatch.tasks,
    })
    .into_response()
}

/// POST /cluster/v1/status
async fn status(State(state): State<ClusterState>, Json(status): Json<TaskStatus>) -> impl IntoResponse {
    let task_id = status.task_id.clone();
    match state.scheduler.status_update(status).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            warn!(task = %task_id, error = %e, "ignoring status update");
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response()
        }
    }
}
