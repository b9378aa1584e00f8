//! Metrics and health endpoints.
//!
//! Liveness and readiness are unconditional: the server answering at all is
//! the signal.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::error::{io_err, DaemonError};
use crate::metrics::Metrics;
use crate::paths::{LIVENESS_ROUTE, METRICS_ROUTE, READINESS_ROUTE};

/// Prometheus text exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub fn router(metrics: Metrics) -> Router {
    Router::new()
        .route(METRICS_ROUTE, get(metrics_handler))
        .route(LIVENESS_ROUTE, get(ok))
        .route(READINESS_ROUTE, get(ok))
        .with_state(metrics)
}

async fn ok() -> &'static str {
    "OK"
}

async fn metrics_handler(State(metrics): State<Metrics>) -> Response {
    match metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics").into_response()
        }
    }
}

/// Bind `addr` and serve until shutdown.
pub async fn serve(
    addr: SocketAddr,
    metrics: Metrics,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| io_err(addr.to_string(), e))?;
    serve_listener(listener, metrics, shutdown_rx).await
}

/// Serve on an already bound listener until shutdown.
pub async fn serve_listener(
    listener: TcpListener,
    metrics: Metrics,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let local = listener
        .local_addr()
        .map_err(|e| io_err("metrics listener", e))?;
    tracing::info!(addr = %local, "serving metrics and health endpoints");
    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| io_err(local.to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    /// Minimal HTTP/1.1 GET; returns the raw response text.
    fn get_raw(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout");
        write!(
            stream,
            "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        )
        .expect("write request");
        let mut response = String::new();
        stream.read_to_string(&mut response).expect("read response");
        response
    }

    type Server = tokio::task::JoinHandle<Result<(), DaemonError>>;

    async fn start(metrics: Metrics) -> (SocketAddr, broadcast::Sender<()>, Server) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let server = tokio::spawn(serve_listener(listener, metrics, shutdown_rx));
        (addr, shutdown_tx, server)
    }

    async fn fetch(addr: SocketAddr, path: &'static str) -> String {
        tokio::task::spawn_blocking(move || get_raw(addr, path))
            .await
            .expect("join")
    }

    #[tokio::test]
    async fn health_routes_answer_ok() {
        let (addr, shutdown_tx, server) = start(Metrics::new().expect("metrics")).await;

        for route in [LIVENESS_ROUTE, READINESS_ROUTE] {
            let response = fetch(addr, route).await;
            assert!(response.starts_with("HTTP/1.1 200"), "{route}: {response}");
            assert!(response.ends_with("OK"), "{route}: {response}");
        }

        shutdown_tx.send(()).expect("shutdown");
        server.await.expect("join").expect("serve");
    }

    #[tokio::test]
    async fn metrics_route_exposes_counters() {
        let metrics = Metrics::new().expect("metrics");
        metrics.inc_successful_upload();
        metrics.inc_upload_retry();
        metrics.inc_upload_retry();
        let (addr, shutdown_tx, server) = start(metrics).await;

        let response = fetch(addr, METRICS_ROUTE).await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(
            response.to_ascii_lowercase().contains("content-type: text/plain; version=0.0.4"),
            "{response}"
        );
        assert!(response.contains("successful_uploads 1"), "{response}");
        assert!(response.contains("upload_retries 2"), "{response}");
        assert!(response.contains("failed_uploads 0"), "{response}");

        shutdown_tx.send(()).expect("shutdown");
        server.await.expect("join").expect("serve");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (addr, shutdown_tx, server) = start(Metrics::new().expect("metrics")).await;

        let response = fetch(addr, "/nope").await;
        assert!(response.starts_with("HTTP/1.1 404"), "{response}");

        shutdown_tx.send(()).expect("shutdown");
        server.await.expect("join").expect("serve");
    }
}
