//! Vehicle service: lock/unlock, listing and telemetry-driven positions.

use chrono::{DateTime, Utc};
use common::{Coordinates, Vehicle, VehicleId};
use store::{LocationUpdate, PageRequest, VehicleStore};

use crate::error::DomainError;

/// Service owning the vehicle store.
#[derive(Clone)]
pub struct VehicleService<S: VehicleStore> {
    store: S,
}

impl<S: VehicleStore> VehicleService<S> {
    /// Creates a new vehicle service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: &VehicleId) -> Result<Vehicle, DomainError> {
        Ok(self.store.get(id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, page: &PageRequest) -> Result<Vec<Vehicle>, DomainError> {
        Ok(self.store.list(page).await?)
    }

    /// Locks an available vehicle.
    #[tracing::instrument(skip(self))]
    pub async fn lock(&self, id: &VehicleId) -> Result<Vehicle, DomainError> {
        match self.store.lock(id).await {
            Ok(vehicle) => {
                metrics::counter!("vehicle_lock_total", "outcome" => "locked").increment(1);
                tracing::info!(vehicle_id = %id, "vehicle locked");
                Ok(vehicle)
            }
            Err(e) => {
                let err = DomainError::from(e);
                if matches!(err, DomainError::AlreadyInUse(_)) {
                    metrics::counter!("vehicle_lock_total", "outcome" => "in_use").increment(1);
                }
                Err(err)
            }
        }
    }

    /// Releases a vehicle. Releasing an available vehicle returns it unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn unlock(&self, id: &VehicleId) -> Result<Vehicle, DomainError> {
        let vehicle = self.store.unlock(id).await?;
        metrics::counter!("vehicle_unlock_total").increment(1);
        tracing::info!(vehicle_id = %id, "vehicle unlocked");
        Ok(vehicle)
    }

    /// Applies a position sample if it is newer than the stored one.
    #[tracing::instrument(skip(self))]
    pub async fn update_location(
        &self,
        id: &VehicleId,
        location: Coordinates,
        recorded_at: DateTime<Utc>,
    ) -> Result<LocationUpdate, DomainError> {
        location.validate()?;
        Ok(self.store.update_location(id, location, recorded_at).await?)
    }

    /// Provisions vehicles; existing IDs are skipped.
    #[tracing::instrument(skip(self, vehicles), fields(count = vehicles.len()))]
    pub async fn provision(&self, vehicles: Vec<Vehicle>) -> Result<Vec<Vehicle>, DomainError> {
        let created = self.store.create_vehicles(vehicles).await?;
        tracing::info!(created = created.len(), "vehicles provisioned");
        Ok(created)
    }
}
