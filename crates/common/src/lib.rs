//! Shared types for the fleet trip services.

pub mod models;
pub mod telemetry;
pub mod types;
pub mod wire;

pub use models::{
    Coordinates, InvalidCoordinates, Location, Trip, TripStatus, UnknownStatus, Vehicle,
    VehicleStatus,
};
pub use telemetry::{DEFAULT_TELEMETRY_TOPIC, TelemetryEvent};
pub use types::{EventId, IdGenerator, SagaId, TimeOrderedIds, TripId, VehicleId};
pub use wire::{
    EndTripRequest, ErrorBody, ErrorCode, StartTripRequest, TrackLocationAccepted,
    TrackLocationRequest,
};
