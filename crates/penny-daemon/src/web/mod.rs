//! Prometheus scrape endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::metrics::SensorMetrics;

/// Creates the web router with all routes.
pub fn create_router(metrics: Arc<SensorMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

/// Serves the router until the listener fails.
pub async fn serve(listener: TcpListener, metrics: Arc<SensorMetrics>) -> std::io::Result<()> {
    axum::serve(listener, create_router(metrics)).await
}

/// GET /metrics - Prometheus text format
async fn metrics_handler(State(metrics): State<Arc<SensorMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// GET /health - Liveness check
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
