//! Telemetry event envelope published on the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Coordinates;
use crate::types::{EventId, TripId, VehicleId};

/// Default topic for location samples.
pub const DEFAULT_TELEMETRY_TOPIC: &str = "trips.telemetry";

/// A location sample for a vehicle on an active trip.
///
/// Delivered at-least-once and in no particular order. `event_id` identifies
/// the sample across redeliveries and `recorded_at` orders samples for the
/// same vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event_id: EventId,
    pub trip_id: TripId,
    pub vehicle_id: VehicleId,
    pub lat: f64,
    pub lng: f64,
    pub recorded_at: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Creates an event stamped with a fresh ID and the current time.
    pub fn new(trip_id: TripId, vehicle_id: VehicleId, location: Coordinates) -> Self {
        Self {
            event_id: EventId::new(),
            trip_id,
            vehicle_id,
            lat: location.lat,
            lng: location.lng,
            recorded_at: Utc::now(),
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }

    /// Partition key: samples for one vehicle share a partition.
    pub fn key(&self) -> &str {
        self.vehicle_id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_published_payload() {
        let trip_id = TripId::new();
        let event_id = EventId::new();
        let payload = serde_json::json!({
            "event_id": event_id.to_string(),
            "trip_id": trip_id.to_string(),
            "vehicle_id": "v7",
            "lat": 48.85,
            "lng": 2.35,
            "recorded_at": "2024-05-01T10:00:00Z"
        });

        let event: TelemetryEvent = serde_json::from_value(payload).unwrap();
        assert_eq!(event.trip_id, trip_id);
        assert_eq!(event.event_id, event_id);
        assert_eq!(event.key(), "v7");
        assert_eq!(event.coordinates(), Coordinates::new(48.85, 2.35));
    }

    #[test]
    fn rejects_payload_without_trip() {
        let payload = serde_json::json!({ "vehicle_id": "v7", "lat": 1.0, "lng": 2.0 });
        assert!(serde_json::from_value::<TelemetryEvent>(payload).is_err());
    }
}
