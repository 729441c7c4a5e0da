use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use common::{Coordinates, Location, Trip, TripId, VehicleId};

use crate::Result;

/// Outcome of appending a telemetry sample to a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationAppend {
    /// A new location row was written.
    Appended,
    /// A sample with the same timestamp was already recorded for the trip.
    Duplicate,
}

/// Truncates a timestamp to the microsecond precision PostgreSQL keeps.
///
/// Both stores apply it to every timestamp they accept, so a value returned
/// by a write equals the value a later read returns, and two samples that
/// differ only below a microsecond are the same sample.
pub fn storage_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Persistence for trips and their location history.
///
/// `create_trip` and `end_trip` are each one transaction: a failure at any
/// step leaves no trace. When the store shares its database with the vehicle
/// store, those transactions also flip the vehicle status.
#[async_trait]
pub trait TripStore: Send + Sync {
    /// Inserts an active trip with its first location.
    ///
    /// Fails with `VehicleInUse` if the vehicle already has an active trip.
    async fn create_trip(
        &self,
        trip_id: TripId,
        vehicle_id: &VehicleId,
        location: Coordinates,
        started_at: DateTime<Utc>,
    ) -> Result<Trip>;

    /// Ends an active trip, appends the final location and returns the trip
    /// with its full history ordered by timestamp.
    ///
    /// The final location follows the same idempotency rule as
    /// `add_location`: if a sample was already recorded at `ended_at`, that
    /// sample is kept and the final location is not added.
    ///
    /// Fails with `TripNotActive` if the trip already ended.
    async fn end_trip(
        &self,
        trip_id: TripId,
        location: Coordinates,
        ended_at: DateTime<Utc>,
    ) -> Result<Trip>;

    /// Appends a sample to an active trip. Idempotent on `(trip_id, recorded_at)`.
    async fn add_location(
        &self,
        trip_id: TripId,
        location: Coordinates,
        recorded_at: DateTime<Utc>,
    ) -> Result<LocationAppend>;

    /// Loads a trip with its location history.
    async fn get_trip(&self, trip_id: TripId) -> Result<Trip>;

    /// Returns a trip's location history ordered by timestamp, oldest first.
    async fn locations_for_trip(&self, trip_id: TripId) -> Result<Vec<Location>>;
}
