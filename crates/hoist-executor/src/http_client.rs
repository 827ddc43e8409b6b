//! Minimal HTTP/1 client over a fresh TCP connection per request.
//!
//! Every call is bounded by a timeout covering connect, request, and the
//! whole response body. Only plain `http://` URLs are supported.

use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ExecResult, ExecutionError};

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Send one request and read the full response.
pub async fn send(
    method: Method,
    url: &str,
    body: Option<Vec<u8>>,
    timeout: Duration,
) -> ExecResult<HttpResponse> {
    let uri: Uri = url
        .parse()
        .map_err(|_| ExecutionError::InvalidUrl(url.to_string()))?;
    if uri.scheme_str() != Some("http") {
        return Err(ExecutionError::InvalidUrl(url.to_string()));
    }
    let authority = uri
        .authority()
        .ok_or_else(|| ExecutionError::InvalidUrl(url.to_string()))?
        .clone();
    let address = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let unreachable = |reason: String| ExecutionError::Unreachable {
        url: url.to_string(),
        reason,
    };

    let exchange = async {
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "http connection closed with error");
            }
        });

        let builder = Request::builder()
            .method(method)
            .uri(path.as_str())
            .header(HOST, authority.as_str())
            .header(USER_AGENT, "hoist/0.1");
        let builder = if body.is_some() {
            builder.header(CONTENT_TYPE, "application/json")
        } else {
            builder
        };
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| ExecutionError::InvalidUrl(format!("{url}: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| unreachable(e.to_string()))?
            .to_bytes();

        debug!(%url, %status, bytes = body.len(), "http response");
        Ok::<_, ExecutionError>(HttpResponse { status, body })
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ExecutionError::Timeout {
            url: url.to_string(),
            after: timeout,
        })?
}

/// POST `value` as JSON.
pub async fn post_json<T: Serialize + ?Sized>(
    url: &str,
    value: &T,
    timeout: Duration,
) -> ExecResult<HttpResponse> {
    let body = serde_json::to_vec(value)?;
    send(Method::POST, url, Some(body), timeout).await
}

/// Fail unless the response is 2xx.
pub fn expect_success(url: &str, resp: HttpResponse) -> ExecResult<HttpResponse> {
    if resp.status.is_success() {
        Ok(resp)
    } else {
        Err(ExecutionError::HttpStatus {
            url: url.to_string(),
            status: resp.status.as_u16(),
            body: resp.body_text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_urls() {
        for url in ["https://exchange:3000/x", "exchange:3000", "not a url"] {
            let err = send(Method::GET, url, None, Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(matches!(err, ExecutionError::InvalidUrl(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        // Bind and drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = send(
            Method::GET,
            &format!("http://127.0.0.1:{port}/"),
            None,
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
        assert!(err.is_transient(), "{err}");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let err = send(
            Method::GET,
            &format!("http://{addr}/"),
            None,
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn non_success_becomes_status_error() {
        let resp = HttpResponse {
            status: StatusCode::BAD_GATEWAY,
            body: Bytes::from_static(b"upstream down"),
        };
        let err = expect_success("http://exchange/upload_container", resp).unwrap_err();
        assert!(matches!(err, ExecutionError::HttpStatus { status: 502, .. }));
    }
}
