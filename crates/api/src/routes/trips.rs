//! Trip service endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{EndTripRequest, IdGenerator, StartTripRequest, Trip, TripId};
use domain::{EndTrip, StartTrip, TripService};
use store::TripStore;

use crate::error::ApiError;

/// Shared state of the trip service.
pub struct TripState<S: TripStore, G: IdGenerator> {
    pub trips: TripService<S, G>,
}

/// POST|PUT /trip/start: creates an active trip with its first location.
#[tracing::instrument(skip(state, payload))]
pub async fn start<S: TripStore + 'static, G: IdGenerator + 'static>(
    State(state): State<Arc<TripState<S, G>>>,
    payload: Result<Json<StartTripRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Trip>), ApiError> {
    let Json(req) = payload?;
    let trip = state
        .trips
        .start_trip(StartTrip::new(req.vehicle_id, req.location))
        .await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

/// POST|PUT /trip/end: ends the trip and returns its full history.
#[tracing::instrument(skip(state, payload))]
pub async fn end<S: TripStore + 'static, G: IdGenerator + 'static>(
    State(state): State<Arc<TripState<S, G>>>,
    payload: Result<Json<EndTripRequest>, JsonRejection>,
) -> Result<Json<Trip>, ApiError> {
    let Json(req) = payload?;
    let trip = state
        .trips
        .end_trip(EndTrip::new(req.trip_id, req.location))
        .await?;
    Ok(Json(trip))
}

/// GET /trip/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: TripStore + 'static, G: IdGenerator + 'static>(
    State(state): State<Arc<TripState<S, G>>>,
    Path(id): Path<String>,
) -> Result<Json<Trip>, ApiError> {
    let trip_id = parse_trip_id(&id)?;
    Ok(Json(state.trips.get_trip(trip_id).await?))
}

pub(crate) fn parse_trip_id(id: &str) -> Result<TripId, ApiError> {
    TripId::parse(id).map_err(|e| ApiError::Validation(format!("Invalid trip id {id}: {e}")))
}
