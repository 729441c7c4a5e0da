//! Commands accepted by the vehicle and trip services.

use common::{Coordinates, TripId, VehicleId};

use crate::error::DomainError;

/// A request to change state, validated before it reaches a store.
pub trait Command: Send + Sync {
    /// Command name used in logs.
    fn name(&self) -> &'static str;

    /// Checks the command's fields.
    fn validate(&self) -> Result<(), DomainError>;
}

fn require_vehicle(id: &VehicleId) -> Result<(), DomainError> {
    if id.is_blank() {
        return Err(DomainError::Validation("vehicle_id is required".to_string()));
    }
    Ok(())
}

/// Start a trip on a vehicle at a position.
#[derive(Debug, Clone)]
pub struct StartTrip {
    pub vehicle_id: VehicleId,
    pub location: Coordinates,
}

impl StartTrip {
    pub fn new(vehicle_id: impl Into<VehicleId>, location: Coordinates) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            location,
        }
    }
}

impl Command for StartTrip {
    fn name(&self) -> &'static str {
        "StartTrip"
    }

    fn validate(&self) -> Result<(), DomainError> {
        require_vehicle(&self.vehicle_id)?;
        self.location.validate()?;
        Ok(())
    }
}

/// End an active trip at a position.
#[derive(Debug, Clone)]
pub struct EndTrip {
    pub trip_id: TripId,
    pub location: Coordinates,
}

impl EndTrip {
    pub fn new(trip_id: TripId, location: Coordinates) -> Self {
        Self { trip_id, location }
    }
}

impl Command for EndTrip {
    fn name(&self) -> &'static str {
        "EndTrip"
    }

    fn validate(&self) -> Result<(), DomainError> {
        self.location.validate()?;
        Ok(())
    }
}

/// Report a vehicle position during a trip.
#[derive(Debug, Clone)]
pub struct TrackLocation {
    pub trip_id: TripId,
    pub vehicle_id: VehicleId,
    pub location: Coordinates,
}

impl TrackLocation {
    pub fn new(trip_id: TripId, vehicle_id: impl Into<VehicleId>, location: Coordinates) -> Self {
        Self {
            trip_id,
            vehicle_id: vehicle_id.into(),
            location,
        }
    }
}

impl Command for TrackLocation {
    fn name(&self) -> &'static str {
        "TrackLocation"
    }

    fn validate(&self) -> Result<(), DomainError> {
        require_vehicle(&self.vehicle_id)?;
        self.location.validate()?;
        Ok(())
    }
}
