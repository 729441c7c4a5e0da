use common::{TripId, VehicleId};
use thiserror::Error;

/// Errors that can occur when interacting with the vehicle or trip store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No vehicle with this public ID exists.
    #[error("Vehicle not found: {0}")]
    VehicleNotFound(VehicleId),

    /// The vehicle is locked or already has an active trip.
    #[error("Vehicle already in use: {0}")]
    VehicleInUse(VehicleId),

    /// No trip with this public ID exists.
    #[error("Trip not found: {0}")]
    TripNotFound(TripId),

    /// The trip has ended and accepts no further changes.
    #[error("Trip is not active: {0}")]
    TripNotActive(TripId),

    /// A row held a value the model cannot represent.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true for "entity absent" errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::VehicleNotFound(_) | StoreError::TripNotFound(_)
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
