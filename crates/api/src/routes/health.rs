//! Health check endpoint.

use axum::Json;
use axum::Router;
use axum::routing::get;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Router serving `GET /health` for the named service.
pub fn router(service: &'static str) -> Router {
    Router::new().route("/health", get(move || check(service)))
}

/// GET /health: returns process health and build metadata.
pub async fn check(service: &'static str) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service,
        version: env!("CARGO_PKG_VERSION"),
    })
}
