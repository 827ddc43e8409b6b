//! Progress observers for the self-test.
//!
//! Progress notes are informational only. They never reach the scheduler
//! and a failing observer never fails the operation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::http_client;

#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Writes progress notes to the log.
#[derive(Debug, Default, Clone)]
pub struct LogObserver;

#[async_trait]
impl ProgressObserver for LogObserver {
    async fn notify(&self, message: &str) {
        info!(%message, "self-test progress");
    }
}

/// POSTs `{"in": "<message>"}` to an external endpoint.
#[derive(Debug, Clone)]
pub struct HttpObserver {
    url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct Note<'a> {
    #[serde(rename = "in")]
    message: &'a str,
}

impl HttpObserver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ProgressObserver for HttpObserver {
    async fn notify(&self, message: &str) {
        let result = http_client::post_json(&self.url, &Note { message }, self.timeout)
            .await
            .and_then(|resp| http_client::expect_success(&self.url, resp));
        if let Err(e) = result {
            warn!(url = %self.url, error = %e, "progress observer unreachable");
        }
    }
}
