//! Vehicle service endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use common::{Vehicle, VehicleId};
use domain::VehicleService;
use serde::Deserialize;
use store::{PageRequest, VehicleStore};

use crate::error::ApiError;

/// Shared state of the vehicle service.
pub struct VehicleState<S: VehicleStore> {
    pub vehicles: VehicleService<S>,
}

/// Keyset pagination parameters: `?cursor=&limit=`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

impl ListParams {
    pub fn page(self) -> PageRequest {
        PageRequest::new(self.cursor, self.limit)
    }
}

/// GET /vehicle/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: VehicleStore + 'static>(
    State(state): State<Arc<VehicleState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vehicle>, ApiError> {
    Ok(Json(state.vehicles.get(&VehicleId::new(id)).await?))
}

/// GET /lock/{id}: marks an available vehicle as in use.
#[tracing::instrument(skip(state))]
pub async fn lock<S: VehicleStore + 'static>(
    State(state): State<Arc<VehicleState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vehicle>, ApiError> {
    Ok(Json(state.vehicles.lock(&VehicleId::new(id)).await?))
}

/// GET /unlock/{id}: releases a vehicle. Unlocking an available vehicle is
/// a no-op.
#[tracing::instrument(skip(state))]
pub async fn unlock<S: VehicleStore + 'static>(
    State(state): State<Arc<VehicleState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vehicle>, ApiError> {
    Ok(Json(state.vehicles.unlock(&VehicleId::new(id)).await?))
}

/// GET /vehicles?cursor=&limit=
#[tracing::instrument(skip(state))]
pub async fn list<S: VehicleStore + 'static>(
    State(state): State<Arc<VehicleState<S>>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Vehicle>>, ApiError> {
    let Query(params) = params?;
    Ok(Json(state.vehicles.list(&params.page()).await?))
}
