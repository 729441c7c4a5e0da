//! Domain error types.

use common::{InvalidCoordinates, TripId, VehicleId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
///
/// Store errors that describe a business outcome (absent entity, vehicle in
/// use, finished trip) are lifted into their own variants; everything else
/// stays wrapped in [`DomainError::Store`].
#[derive(Debug, Error)]
pub enum DomainError {
    /// Vehicle does not exist.
    #[error("Vehicle not found: {0}")]
    VehicleNotFound(VehicleId),

    /// Trip does not exist.
    #[error("Trip not found: {0}")]
    TripNotFound(TripId),

    /// Vehicle is locked or already has an active trip.
    #[error("Vehicle already in use: {0}")]
    AlreadyInUse(VehicleId),

    /// The trip has ended; no transition leaves `Ended`.
    #[error("Trip is not active: {0}")]
    TripNotActive(TripId),

    /// Malformed command.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    /// Returns true for "entity absent" errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomainError::VehicleNotFound(_) | DomainError::TripNotFound(_)
        )
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VehicleNotFound(id) => DomainError::VehicleNotFound(id),
            StoreError::TripNotFound(id) => DomainError::TripNotFound(id),
            StoreError::VehicleInUse(id) => DomainError::AlreadyInUse(id),
            StoreError::TripNotActive(id) => DomainError::TripNotActive(id),
            other => DomainError::Store(other),
        }
    }
}

impl From<InvalidCoordinates> for DomainError {
    fn from(err: InvalidCoordinates) -> Self {
        DomainError::Validation(err.to_string())
    }
}
