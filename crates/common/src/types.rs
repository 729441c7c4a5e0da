use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public identifier of a vehicle.
///
/// Vehicles are provisioned outside this system, so the identifier is an
/// opaque string rather than a generated value. Listing pages on its
/// lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(String);

impl VehicleId {
    /// Creates a vehicle ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the ID is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VehicleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new time-ordered ID.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parses an ID from its hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Public identifier of a trip.
    ///
    /// Backed by a UUIDv7, so IDs sort in creation order both as values and
    /// in their string form.
    TripId
);

uuid_id!(
    /// Identifier of a single saga execution.
    SagaId
);

uuid_id!(
    /// Identifier carried by every telemetry event, used for deduplication.
    EventId
);

/// Source of trip identifiers.
///
/// Trip IDs are assigned by the service layer before anything touches the
/// store. Implementations must be collision resistant and their IDs must be
/// comparable in creation order.
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh trip ID.
    fn new_trip_id(&self) -> TripId;

    /// Orders two IDs by the time they were generated.
    fn compare(&self, a: &TripId, b: &TripId) -> Ordering {
        a.cmp(b)
    }
}

/// Generates UUIDv7 trip IDs.
///
/// UUIDv7 puts a millisecond timestamp in the high bits and fills the rest
/// with randomness, so IDs from the same millisecond still differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeOrderedIds;

impl IdGenerator for TimeOrderedIds {
    fn new_trip_id(&self) -> TripId {
        TripId::new()
    }
}
