//! Per-service handlers that apply a decoded telemetry event.

use async_trait::async_trait;
use common::{IdGenerator, TelemetryEvent};
use domain::{DomainError, TripService, VehicleService};
use store::{LocationAppend, LocationUpdate, TripStore, VehicleStore};

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The store changed.
    Applied,
    /// The store already held this sample.
    Duplicate,
    /// The store held a newer sample; nothing changed.
    Stale,
}

impl HandleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleOutcome::Applied => "applied",
            HandleOutcome::Duplicate => "duplicate",
            HandleOutcome::Stale => "stale",
        }
    }
}

/// Applies telemetry events to one service's store.
#[async_trait]
pub trait TelemetryHandler: Send + Sync {
    /// Handler name, used in logs and metric labels.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &TelemetryEvent) -> Result<HandleOutcome, DomainError>;
}

/// Moves the vehicle to the sample's position if the sample is newer.
pub struct VehicleLocationHandler<S: VehicleStore> {
    service: VehicleService<S>,
}

impl<S: VehicleStore> VehicleLocationHandler<S> {
    pub fn new(service: VehicleService<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S: VehicleStore> TelemetryHandler for VehicleLocationHandler<S> {
    fn name(&self) -> &'static str {
        "vehicle_location"
    }

    async fn handle(&self, event: &TelemetryEvent) -> Result<HandleOutcome, DomainError> {
        let update = self
            .service
            .update_location(&event.vehicle_id, event.coordinates(), event.recorded_at)
            .await?;
        Ok(match update {
            LocationUpdate::Applied => HandleOutcome::Applied,
            LocationUpdate::Stale => HandleOutcome::Stale,
        })
    }
}

/// Appends the sample to the trip's location history.
pub struct TripLocationHandler<S: TripStore, G: IdGenerator> {
    service: TripService<S, G>,
}

impl<S: TripStore, G: IdGenerator> TripLocationHandler<S, G> {
    pub fn new(service: TripService<S, G>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S: TripStore, G: IdGenerator> TelemetryHandler for TripLocationHandler<S, G> {
    fn name(&self) -> &'static str {
        "trip_location"
    }

    async fn handle(&self, event: &TelemetryEvent) -> Result<HandleOutcome, DomainError> {
        let append = self
            .service
            .add_location(event.trip_id, event.coordinates(), event.recorded_at)
            .await?;
        Ok(match append {
            LocationAppend::Appended => HandleOutcome::Applied,
            LocationAppend::Duplicate => HandleOutcome::Duplicate,
        })
    }
}
