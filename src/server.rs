use crate::alerting::{AlertThresholdEvaluator, EndpointStats};
use crate::error::MonitorError;
use crate::metrics::MetricsRegistry;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
pub struct StatusState {
    pub evaluator: Arc<AlertThresholdEvaluator>,
    pub metrics: Option<Arc<MetricsRegistry>>,
}

pub fn status_router(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the status endpoints on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, state: StatusState, shutdown: F) -> Result<(), MonitorError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(MonitorError::Server)?;
    info!(%addr, "status server listening");

    axum::serve(listener, status_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(MonitorError::Server)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn stats_handler(State(state): State<StatusState>) -> Json<BTreeMap<String, EndpointStats>> {
    Json(state.evaluator.get_stats())
}

async fn metrics_handler(State(state): State<StatusState>) -> Response {
    match &state.metrics {
        Some(metrics) => (
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            metrics.render_prometheus(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics are not enabled").into_response(),
    }
}
