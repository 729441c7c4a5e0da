//! Prometheus metrics endpoint.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;

/// Router serving `GET /metrics` from the installed recorder.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(get_metrics)).with_state(handle)
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
