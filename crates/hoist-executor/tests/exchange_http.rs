//! HTTP exchange client tests against an in-process exchange server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use hoist_core::{ContainerSpec, TransferEnvelope};
use hoist_executor::{ExchangeClient, ExecutionError, HttpExchange};

#[derive(Clone)]
struct Exchange {
    store: Arc<Mutex<HashMap<String, TransferEnvelope>>>,
    upload_status: StatusCode,
}

async fn upload(State(ex): State<Exchange>, Json(envelope): Json<TransferEnvelope>) -> StatusCode {
    if ex.upload_status == StatusCode::OK {
        ex.store
            .lock()
            .unwrap()
            .insert(envelope.container.name.clone(), envelope);
    }
    ex.upload_status
}

async fn download(
    State(ex): State<Exchange>,
    Path(name): Path<String>,
) -> Result<Json<TransferEnvelope>, StatusCode> {
    ex.store
        .lock()
        .unwrap()
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Start an exchange and return its base URL.
async fn spawn_exchange(upload_status: StatusCode) -> String {
    let state = Exchange {
        store: Arc::default(),
        upload_status,
    };
    let app = Router::new()
        .route("/upload_container", post(upload))
        .route("/download_container/{name}", get(download))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn envelope() -> TransferEnvelope {
    TransferEnvelope::new(
        ContainerSpec::new("web1", "busybox:latest", "echo hi; sleep 600"),
        vec![0x1f, 0x8b, 0x08, 0x00, 0xff, 0x00, 0x7f, 0x00],
    )
}

#[tokio::test]
async fn upload_then_download_preserves_envelope() {
    let base = spawn_exchange(StatusCode::OK).await;
    let client = HttpExchange::new(Duration::from_secs(5));

    client.upload(&base, &envelope()).await.unwrap();
    let fetched = client.download(&base, "web1").await.unwrap();

    assert_eq!(fetched, envelope());
}

#[tokio::test]
async fn non_200_upload_is_rejected() {
    // 201 is a success code but not the exchange's acceptance answer.
    let base = spawn_exchange(StatusCode::CREATED).await;
    let err = HttpExchange::default()
        .upload(&base, &envelope())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::HttpStatus { status: 201, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn server_error_on_upload_is_transient() {
    let base = spawn_exchange(StatusCode::SERVICE_UNAVAILABLE).await;
    let err = HttpExchange::default()
        .upload(&base, &envelope())
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn download_of_unknown_container_is_permanent() {
    let base = spawn_exchange(StatusCode::OK).await;
    let err = HttpExchange::default()
        .download(&base, "ghost")
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::HttpStatus { status: 404, .. }));
    assert!(!err.is_transient());
}
