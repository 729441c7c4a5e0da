//! Clients for the two services the saga coordinates.
//!
//! [`http`] talks to remote services; [`local`] wraps in-process services
//! and can inject failures, which is how the saga's failure paths are tested.

pub mod http;
pub mod local;

use async_trait::async_trait;
use common::{Coordinates, Trip, TripId, Vehicle, VehicleId};
use store::PageRequest;

use crate::error::ClientError;

/// Name used for the vehicle service in errors and logs.
pub const VEHICLE_SERVICE: &str = "vehicle-service";
/// Name used for the trip service in errors and logs.
pub const TRIP_SERVICE: &str = "trip-service";

/// Operations the saga needs from the vehicle service.
#[async_trait]
pub trait VehicleClient: Send + Sync {
    async fn get_vehicle(&self, id: &VehicleId) -> Result<Vehicle, ClientError>;

    async fn list_vehicles(&self, page: &PageRequest) -> Result<Vec<Vehicle>, ClientError>;

    /// Locks an available vehicle. Fails with `AlreadyInUse` otherwise.
    async fn lock(&self, id: &VehicleId) -> Result<Vehicle, ClientError>;

    /// Releases a vehicle. Idempotent.
    async fn unlock(&self, id: &VehicleId) -> Result<Vehicle, ClientError>;
}

/// Operations the saga needs from the trip service.
#[async_trait]
pub trait TripClient: Send + Sync {
    async fn start_trip(
        &self,
        vehicle_id: &VehicleId,
        location: Coordinates,
    ) -> Result<Trip, ClientError>;

    async fn end_trip(&self, trip_id: TripId, location: Coordinates) -> Result<Trip, ClientError>;

    async fn get_trip(&self, trip_id: TripId) -> Result<Trip, ClientError>;
}
