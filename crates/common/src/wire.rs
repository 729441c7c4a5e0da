//! JSON bodies exchanged between clients, the gateway and the services.

use serde::{Deserialize, Serialize};

use crate::models::Coordinates;
use crate::types::{EventId, TripId, VehicleId};

/// `POST /trip/start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartTripRequest {
    pub vehicle_id: VehicleId,
    pub location: Coordinates,
}

/// `POST /trip/end`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndTripRequest {
    pub trip_id: TripId,
    pub location: Coordinates,
}

/// `POST /trip/track` on the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackLocationRequest {
    pub trip_id: TripId,
    pub vehicle_id: VehicleId,
    pub lat: f64,
    pub lng: f64,
}

impl TrackLocationRequest {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }
}

/// Answer to an accepted telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackLocationAccepted {
    pub event_id: EventId,
}

/// Machine-readable error kind carried next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    AlreadyInUse,
    TripNotActive,
    Validation,
    BadGateway,
    Internal,
}

/// Error body returned by every service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}
