//! Exchange service client.
//!
//! The exchange holds checkpointed containers between the upload on the
//! source host and the download on the target host:
//!
//! - `POST {exchange}/upload_container` with a [`TransferEnvelope`] body;
//!   only `200 OK` counts as accepted.
//! - `GET {exchange}/download_container/{name}` answers with the envelope.

use std::time::Duration;

use async_trait::async_trait;
use http::{Method, StatusCode};
use tracing::info;

use hoist_core::TransferEnvelope;

use crate::error::{ExecResult, ExecutionError};
use crate::http_client;

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn upload(&self, exchange: &str, envelope: &TransferEnvelope) -> ExecResult<()>;

    async fn download(&self, exchange: &str, name: &str) -> ExecResult<TransferEnvelope>;
}

/// HTTP exchange client with a per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    timeout: Duration,
}

impl HttpExchange {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpExchange {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

fn endpoint(exchange: &str, path: &str) -> String {
    format!("{}/{}", exchange.trim_end_matches('/'), path)
}

#[async_trait]
impl ExchangeClient for HttpExchange {
    async fn upload(&self, exchange: &str, envelope: &TransferEnvelope) -> ExecResult<()> {
        let url = endpoint(exchange, "upload_container");
        let body = envelope.to_json()?;
        let resp = http_client::send(Method::POST, &url, Some(body), self.timeout).await?;

        if resp.status != StatusCode::OK {
            return Err(ExecutionError::HttpStatus {
                url,
                status: resp.status.as_u16(),
                body: resp.body_text(),
            });
        }
        info!(
            container = %envelope.container.name,
            bytes = envelope.data.len(),
            %url,
            "checkpoint uploaded"
        );
        Ok(())
    }

    async fn download(&self, exchange: &str, name: &str) -> ExecResult<TransferEnvelope> {
        let url = endpoint(exchange, &format!("download_container/{name}"));
        let resp = http_client::send(Method::GET, &url, None, self.timeout).await?;
        let resp = http_client::expect_success(&url, resp)?;

        let envelope = TransferEnvelope::from_json(&resp.body)?;
        info!(
            container = %envelope.container.name,
            bytes = envelope.data.len(),
            %url,
            "checkpoint downloaded"
        );
        Ok(envelope)
    }
}
