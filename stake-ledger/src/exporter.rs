//! HTTP exposition of ledger metrics
//!
//! Serves `GET /metrics` in the Prometheus text format. Every other path
//! answers 404, and other methods on `/metrics` answer 405.

use crate::{error::Result, metrics::Metrics};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;

async fn metrics_handler(State(metrics): State<Metrics>) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metrics.registry().gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics.").into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found.")
}

/// Router exposing `metrics` under `/metrics`
pub fn metrics_router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .with_state(metrics)
}

/// Bind the metrics listener, failing fast when the address is unusable
pub async fn bind_metrics(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Metrics listening");
    Ok(listener)
}

/// Serve `metrics` on an already bound listener until the task is dropped
pub async fn serve_metrics(listener: TcpListener, metrics: Metrics) -> Result<()> {
    axum::serve(listener, metrics_router(metrics)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    fn test_metrics() -> Metrics {
        let metrics = Metrics::new().unwrap();
        metrics.deposits_total.inc();
        metrics
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_get_metrics() {
        let response = metrics_router(test_metrics())
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body_text(response)
            .await
            .contains("stake_ledger_deposits_total 1"));
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let request = Request::builder()
            .method("DELETE")
            .uri("/definitely-not-metrics")
            .body(Body::empty())
            .unwrap();
        let response = metrics_router(test_metrics()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "Not found.");
    }

    #[tokio::test]
    async fn test_other_method_on_metrics_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = metrics_router(test_metrics()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_bind_in_use_address_fails() {
        let first = bind_metrics("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap().to_string();

        assert!(matches!(
            bind_metrics(&addr).await,
            Err(crate::Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let listener = bind_metrics("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_metrics(listener, test_metrics()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 404"));
        server.abort();
    }
}
