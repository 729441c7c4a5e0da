//! Vehicle, trip and location models shared by every service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{TripId, VehicleId};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Rejected coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidCoordinates {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
}

impl Coordinates {
    /// Creates coordinates without validating them.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Checks that both components are finite and within range.
    pub fn validate(&self) -> Result<(), InvalidCoordinates> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(InvalidCoordinates::Latitude(self.lat));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(InvalidCoordinates::Longitude(self.lng));
        }
        Ok(())
    }
}

/// Error returned when parsing a status string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

/// Availability of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    #[default]
    Available,
    InUse,
}

impl VehicleStatus {
    /// Returns the persisted/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "available",
            VehicleStatus::InUse => "in_use",
        }
    }
}

impl std::fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VehicleStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(VehicleStatus::Available),
            "in_use" => Ok(VehicleStatus::InUse),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Lifecycle of a trip. `Active --end--> Ended`, nothing leaves `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Active,
    Ended,
}

impl TripStatus {
    /// Returns the persisted/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Active => "active",
            TripStatus::Ended => "ended",
        }
    }

    /// Returns true if the trip accepts new locations.
    pub fn is_active(&self) -> bool {
        matches!(self, TripStatus::Active)
    }
}

impl std::fmt::Display for TripStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TripStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TripStatus::Active),
            "ended" => Ok(TripStatus::Ended),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A vehicle and its last known position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub status: VehicleStatus,
    pub location: Coordinates,
    /// Timestamp of the sample that produced `location`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_updated_at: Option<DateTime<Utc>>,
}

impl Vehicle {
    /// Creates an available vehicle at the given position.
    pub fn available(id: impl Into<VehicleId>, location: Coordinates) -> Self {
        Self {
            id: id.into(),
            status: VehicleStatus::Available,
            location,
            location_updated_at: None,
        }
    }

    /// Returns true if the vehicle can be locked.
    pub fn is_available(&self) -> bool {
        self.status == VehicleStatus::Available
    }
}

/// A timestamped position sample belonging to a trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub recorded_at: DateTime<Utc>,
}

impl Location {
    pub fn new(coordinates: Coordinates, recorded_at: DateTime<Utc>) -> Self {
        Self {
            lat: coordinates.lat,
            lng: coordinates.lng,
            recorded_at,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }
}

/// A rental session on one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub status: TripStatus,
    pub vehicle_id: VehicleId,
    /// Location history ordered by `recorded_at`, oldest first.
    pub locations: Vec<Location>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_validation_bounds() {
        assert!(Coordinates::new(0.0, 0.0).validate().is_ok());
        assert!(Coordinates::new(90.0, -180.0).validate().is_ok());
        assert_eq!(
            Coordinates::new(90.5, 0.0).validate(),
            Err(InvalidCoordinates::Latitude(90.5))
        );
        assert_eq!(
            Coordinates::new(0.0, 181.0).validate(),
            Err(InvalidCoordinates::Longitude(181.0))
        );
        assert!(Coordinates::new(f64::NAN, 0.0).validate().is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn vehicle_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&VehicleStatus::InUse).unwrap(),
            "\"in_use\""
        );
        assert_eq!("available".parse::<VehicleStatus>(), Ok(VehicleStatus::Available));
        assert!("parked".parse::<VehicleStatus>().is_err());
    }

    #[test]
    fn trip_status_wire_format() {
        assert_eq!(serde_json::to_string(&TripStatus::Ended).unwrap(), "\"ended\"");
        assert_eq!("active".parse::<TripStatus>(), Ok(TripStatus::Active));
        assert!(TripStatus::Active.is_active());
        assert!(!TripStatus::Ended.is_active());
    }

    #[test]
    fn vehicle_json_shape() {
        let vehicle = Vehicle::available("v1", Coordinates::new(1.0, 2.0));
        let json = serde_json::to_value(&vehicle).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "v1",
                "status": "available",
                "location": { "lat": 1.0, "lng": 2.0 }
            })
        );
    }
}
