//! HTTP services for the fleet.
//!
//! Three processes share this crate:
//! - vehicle service: lock/unlock/list over the vehicle store
//! - trip service: trip start/end over the trip store
//! - gateway: trip sagas across both, vehicle proxies and telemetry intake
//!
//! Each router carries structured request logging (tracing) and a
//! Prometheus metrics endpoint.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use common::IdGenerator;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{SagaJournal, TripClient, VehicleClient};
use store::{TripStore, VehicleStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::gateway::GatewayState;
use routes::trips::TripState;
use routes::vehicles::VehicleState;

pub const VEHICLE_SERVICE: &str = saga::VEHICLE_SERVICE;
pub const TRIP_SERVICE: &str = saga::TRIP_SERVICE;
pub const GATEWAY: &str = "gateway";

/// Creates the vehicle service router.
pub fn create_vehicle_app<S: VehicleStore + 'static>(
    state: Arc<VehicleState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let api = Router::new()
        .route("/vehicle/{id}", get(routes::vehicles::get::<S>))
        .route("/lock/{id}", get(routes::vehicles::lock::<S>))
        .route("/unlock/{id}", get(routes::vehicles::unlock::<S>))
        .route("/vehicles", get(routes::vehicles::list::<S>))
        .with_state(state);

    finish(api, VEHICLE_SERVICE, metrics_handle)
}

/// Creates the trip service router.
pub fn create_trip_app<S, G>(state: Arc<TripState<S, G>>, metrics_handle: PrometheusHandle) -> Router
where
    S: TripStore + 'static,
    G: IdGenerator + 'static,
{
    let api = Router::new()
        .route(
            "/trip/start",
            post(routes::trips::start::<S, G>).put(routes::trips::start::<S, G>),
        )
        .route(
            "/trip/end",
            post(routes::trips::end::<S, G>).put(routes::trips::end::<S, G>),
        )
        .route("/trip/{id}", get(routes::trips::get::<S, G>))
        .with_state(state);

    finish(api, TRIP_SERVICE, metrics_handle)
}

/// Creates the gateway router.
pub fn create_gateway_app<V, T, J>(
    state: Arc<GatewayState<V, T, J>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    V: VehicleClient + 'static,
    T: TripClient + 'static,
    J: SagaJournal + 'static,
{
    let api = Router::new()
        .route("/vehicle/{id}", get(routes::gateway::get_vehicle::<V, T, J>))
        .route("/vehicles", get(routes::gateway::list_vehicles::<V, T, J>))
        .route("/trip/start", post(routes::gateway::start_trip::<V, T, J>))
        .route("/trip/end", post(routes::gateway::end_trip::<V, T, J>))
        .route("/trip/track", post(routes::gateway::track::<V, T, J>))
        .route("/sagas/{id}", get(routes::gateway::get_saga::<V, T, J>))
        .route(
            "/reconciliation",
            get(routes::gateway::reconciliation::<V, T, J>),
        )
        .route(
            "/reconciliation/{saga_id}",
            delete(routes::gateway::resolve_reconciliation::<V, T, J>),
        )
        .with_state(state);

    finish(api, GATEWAY, metrics_handle)
}

fn finish(api: Router, service: &'static str, metrics_handle: PrometheusHandle) -> Router {
    api.merge(routes::health::router(service))
        .merge(routes::metrics::router(metrics_handle))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
