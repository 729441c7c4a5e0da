//! Saga kinds and step names of the trip lifecycle.

use serde::{Deserialize, Serialize};

/// Lock the vehicle on the vehicle service. Compensated by an unlock.
pub const STEP_LOCK_VEHICLE: &str = "lock_vehicle";
/// Create the trip on the trip service.
pub const STEP_CREATE_TRIP: &str = "create_trip";
/// End the trip on the trip service. Never compensated.
pub const STEP_END_TRIP: &str = "end_trip";
/// Release the vehicle after its trip ended.
pub const STEP_UNLOCK_VEHICLE: &str = "unlock_vehicle";

/// Which lifecycle transition a saga drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaKind {
    StartTrip,
    EndTrip,
}

impl SagaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaKind::StartTrip => "StartTrip",
            SagaKind::EndTrip => "EndTrip",
        }
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &'static [&'static str] {
        match self {
            SagaKind::StartTrip => &[STEP_LOCK_VEHICLE, STEP_CREATE_TRIP],
            SagaKind::EndTrip => &[STEP_END_TRIP, STEP_UNLOCK_VEHICLE],
        }
    }
}

impl std::fmt::Display for SagaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
