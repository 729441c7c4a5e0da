use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Coordinates, Vehicle, VehicleId};

use crate::Result;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page a single listing may return.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Keyset pagination over vehicles, newest public ID first.
///
/// Without a cursor the first page is returned. With a cursor, rows whose
/// public ID is `<=` the cursor are returned, so the cursor is the ID of the
/// first row of the requested page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: Option<VehicleId>,
    pub limit: u32,
}

impl PageRequest {
    /// Builds a page request, treating an empty cursor as "first page" and a
    /// missing or zero limit as [`DEFAULT_PAGE_SIZE`].
    pub fn new(cursor: Option<String>, limit: Option<u32>) -> Self {
        let cursor = cursor
            .filter(|c| !c.trim().is_empty())
            .map(VehicleId::new);
        let limit = match limit {
            None | Some(0) => DEFAULT_PAGE_SIZE,
            Some(n) => n.min(MAX_PAGE_SIZE),
        };
        Self { cursor, limit }
    }

    /// First page with the default size.
    pub fn first() -> Self {
        Self::new(None, None)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

/// Outcome of a telemetry-driven position update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationUpdate {
    /// The position was overwritten.
    Applied,
    /// The stored position is newer than the sample; nothing changed.
    Stale,
}

/// Persistence for vehicles.
///
/// Lock and unlock are the only status transitions. Both are single
/// conditional writes so that concurrent callers are serialized by the store
/// itself, not by the caller.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    /// Loads a vehicle.
    async fn get(&self, id: &VehicleId) -> Result<Vehicle>;

    /// Lists vehicles ordered by public ID descending.
    async fn list(&self, page: &PageRequest) -> Result<Vec<Vehicle>>;

    /// Marks an available vehicle as in use and returns the updated record.
    ///
    /// Fails with `VehicleInUse` if it is already locked and with
    /// `VehicleNotFound` if it does not exist. Of several concurrent calls for
    /// the same vehicle exactly one succeeds.
    async fn lock(&self, id: &VehicleId) -> Result<Vehicle>;

    /// Marks a vehicle as available and returns the updated record.
    ///
    /// Unlocking an available vehicle is a no-op that returns it unchanged.
    async fn unlock(&self, id: &VehicleId) -> Result<Vehicle>;

    /// Overwrites the last known position if `recorded_at` is newer than the
    /// stored one.
    async fn update_location(
        &self,
        id: &VehicleId,
        location: Coordinates,
        recorded_at: DateTime<Utc>,
    ) -> Result<LocationUpdate>;

    /// Provisions vehicles. Existing public IDs are left untouched and are not
    /// part of the returned list.
    async fn create_vehicles(&self, vehicles: Vec<Vehicle>) -> Result<Vec<Vehicle>>;
}
