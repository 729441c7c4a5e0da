//! Gateway endpoints: trip sagas, vehicle proxies and telemetry intake.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{
    EndTripRequest, SagaId, StartTripRequest, TelemetryEvent, TrackLocationAccepted,
    TrackLocationRequest, Trip, Vehicle, VehicleId,
};
use domain::{Command, EndTrip, StartTrip, TrackLocation};
use messaging::{Publisher, publish_json};
use saga::{
    ReconciliationItem, SagaInstance, SagaJournal, SagaOutcome, TripClient, TripSagaCoordinator,
    VehicleClient,
};

use crate::error::ApiError;
use crate::routes::vehicles::ListParams;

/// Header carrying the saga ID on start/end trip responses.
pub const SAGA_ID_HEADER: &str = "x-saga-id";

/// Shared state of the gateway.
pub struct GatewayState<V: VehicleClient, T: TripClient, J: SagaJournal> {
    pub coordinator: TripSagaCoordinator<V, T, J>,
    pub publisher: Arc<dyn Publisher>,
    pub telemetry_topic: String,
}

/// GET /vehicle/{id}: forwarded to the vehicle service.
#[tracing::instrument(skip(state))]
pub async fn get_vehicle<V, T, J>(
    State(state): State<Arc<GatewayState<V, T, J>>>,
    Path(id): Path<String>,
) -> Result<Json<Vehicle>, ApiError>
where
    V: VehicleClient + 'static,
    T: TripClient + 'static,
    J: SagaJournal + 'static,
{
    let vehicle = state
        .coordinator
        .vehicles()
        .get_vehicle(&VehicleId::new(id))
        .await?;
    Ok(Json(vehicle))
}

/// GET /vehicles?cursor=&limit=: forwarded to the vehicle service.
#[tracing::instrument(skip(state))]
pub async fn list_vehicles<V, T, J>(
    State(state): State<Arc<GatewayState<V, T, J>>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Vehicle>>, ApiError>
where
    V: VehicleClient + 'static,
    T: TripClient + 'static,
    J: SagaJournal + 'static,
{
    let Query(params) = params?;
    let vehicles = state
        .coordinator
        .vehicles()
        .list_vehicles(&params.page())
        .await?;
    Ok(Json(vehicles))
}

/// POST /trip/start: runs the start trip saga.
#[tracing::instrument(skip(state, payload))]
pub async fn start_trip<V, T, J>(
    State(state): State<Arc<GatewayState<V, T, J>>>,
    payload: Result<Json<StartTripRequest>, JsonRejection>,
) -> Result<Response, ApiError>
where
    V: VehicleClient + 'static,
    T: TripClient + 'static,
    J: SagaJournal + 'static,
{
    let Json(req) = payload?;
    let outcome = state
        .coordinator
        .start_trip(StartTrip::new(req.vehicle_id, req.location))
        .await?;
    Ok(saga_response(outcome, StatusCode::CREATED))
}

/// POST /trip/end: runs the end trip saga.
#[tracing::instrument(skip(state, payload))]
pub async fn end_trip<V, T, J>(
    State(state): State<Arc<GatewayState<V, T, J>>>,
    payload: Result<Json<EndTripRequest>, JsonRejection>,
) -> Result<Response, ApiError>
where
    V: VehicleClient + 'static,
    T: TripClient + 'static,
    J: SagaJournal + 'static,
{
    let Json(req) = payload?;
    let outcome = state
        .coordinator
        .end_trip(EndTrip::new(req.trip_id, req.location))
        .await?;
    Ok(saga_response(outcome, StatusCode::OK))
}

/// POST /trip/track: publishes a location sample and answers before any
/// consumer has seen it.
#[tracing::instrument(skip(state, payload))]
pub async fn track<V, T, J>(
    State(state): State<Arc<GatewayState<V, T, J>>>,
    payload: Result<Json<TrackLocationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TrackLocationAccepted>), ApiError>
where
    V: VehicleClient + 'static,
    T: TripClient + 'static,
    J: SagaJournal + 'static,
{
    let Json(req) = payload?;
    let cmd = TrackLocation::new(req.trip_id, req.vehicle_id.clone(), req.coordinates());
    cmd.validate()?;

    let event = TelemetryEvent::new(cmd.trip_id, cmd.vehicle_id, cmd.location);
    publish_json(
        state.publisher.as_ref(),
        &state.telemetry_topic,
        Some(event.key()),
        &event,
    )
    .await?;

    metrics::counter!("telemetry_published_total").increment(1);
    tracing::debug!(event_id = %event.event_id, trip_id = %event.trip_id, "telemetry published");
    Ok((
        StatusCode::ACCEPTED,
        Json(TrackLocationAccepted {
            event_id: event.event_id,
        }),
    ))
}

/// GET /sagas/{id}: a saga rebuilt from its journal.
#[tracing::instrument(skip(state))]
pub async fn get_saga<V, T, J>(
    State(state): State<Arc<GatewayState<V, T, J>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaInstance>, ApiError>
where
    V: VehicleClient + 'static,
    T: TripClient + 'static,
    J: SagaJournal + 'static,
{
    let saga_id = SagaId::parse(&id)
        .map_err(|e| ApiError::Validation(format!("Invalid saga id {id}: {e}")))?;
    let saga = state.coordinator.get_saga(saga_id).await?;
    Ok(Json(saga))
}

/// GET /reconciliation: vehicles the sagas left inconsistent.
#[tracing::instrument(skip(state))]
pub async fn reconciliation<V, T, J>(
    State(state): State<Arc<GatewayState<V, T, J>>>,
) -> Json<Vec<ReconciliationItem>>
where
    V: VehicleClient + 'static,
    T: TripClient + 'static,
    J: SagaJournal + 'static,
{
    Json(state.coordinator.pending_reconciliations().await)
}

/// DELETE /reconciliation/{saga_id}: marks an item repaired.
#[tracing::instrument(skip(state))]
pub async fn resolve_reconciliation<V, T, J>(
    State(state): State<Arc<GatewayState<V, T, J>>>,
    Path(id): Path<String>,
) -> Result<Json<ReconciliationItem>, ApiError>
where
    V: VehicleClient + 'static,
    T: TripClient + 'static,
    J: SagaJournal + 'static,
{
    let saga_id = SagaId::parse(&id)
        .map_err(|e| ApiError::Validation(format!("Invalid saga id {id}: {e}")))?;
    let item = state.coordinator.resolve_reconciliation(saga_id).await?;
    Ok(Json(item))
}

/// Trip body on success, mapped error otherwise; the saga ID header is set
/// either way.
fn saga_response(outcome: SagaOutcome<Trip>, success: StatusCode) -> Response {
    let header = [(SAGA_ID_HEADER, outcome.saga_id.to_string())];
    match outcome.result {
        Ok(trip) => (success, header, Json(trip)).into_response(),
        Err(e) => (header, ApiError::from(e)).into_response(),
    }
}
