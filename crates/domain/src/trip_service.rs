//! Trip service: transactional start/end and telemetry appends.

use chrono::{DateTime, Utc};
use common::{Coordinates, IdGenerator, Location, Trip, TripId};
use store::{LocationAppend, TripStore};

use crate::command::{Command, EndTrip, StartTrip};
use crate::error::DomainError;

/// Service owning the trip store.
///
/// Trip IDs come from the injected generator, never from the store.
#[derive(Clone)]
pub struct TripService<S: TripStore, G: IdGenerator> {
    store: S,
    ids: G,
}

impl<S: TripStore, G: IdGenerator> TripService<S, G> {
    /// Creates a new trip service.
    pub fn new(store: S, ids: G) -> Self {
        Self { store, ids }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records a new active trip for a vehicle the caller has already locked.
    #[tracing::instrument(skip(self), fields(command = cmd.name()))]
    pub async fn start_trip(&self, cmd: StartTrip) -> Result<Trip, DomainError> {
        cmd.validate()?;

        let trip_id = self.ids.new_trip_id();
        let trip = self
            .store
            .create_trip(trip_id, &cmd.vehicle_id, cmd.location, Utc::now())
            .await?;

        metrics::counter!("trips_started_total").increment(1);
        tracing::info!(%trip_id, vehicle_id = %cmd.vehicle_id, "trip started");
        Ok(trip)
    }

    /// Ends an active trip and returns it with its full location history.
    #[tracing::instrument(skip(self), fields(command = cmd.name()))]
    pub async fn end_trip(&self, cmd: EndTrip) -> Result<Trip, DomainError> {
        cmd.validate()?;

        let trip = self
            .store
            .end_trip(cmd.trip_id, cmd.location, Utc::now())
            .await?;

        metrics::counter!("trips_ended_total").increment(1);
        tracing::info!(
            trip_id = %trip.id,
            vehicle_id = %trip.vehicle_id,
            locations = trip.locations.len(),
            "trip ended"
        );
        Ok(trip)
    }

    /// Appends a telemetry sample to an active trip.
    #[tracing::instrument(skip(self))]
    pub async fn add_location(
        &self,
        trip_id: TripId,
        location: Coordinates,
        recorded_at: DateTime<Utc>,
    ) -> Result<LocationAppend, DomainError> {
        location.validate()?;
        Ok(self
            .store
            .add_location(trip_id, location, recorded_at)
            .await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_trip(&self, trip_id: TripId) -> Result<Trip, DomainError> {
        Ok(self.store.get_trip(trip_id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn locations(&self, trip_id: TripId) -> Result<Vec<Location>, DomainError> {
        Ok(self.store.locations_for_trip(trip_id).await?)
    }
}
