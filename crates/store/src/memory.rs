use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    Coordinates, Location, Trip, TripId, TripStatus, Vehicle, VehicleId, VehicleStatus,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    trip::{LocationAppend, TripStore, storage_precision},
    vehicle::{LocationUpdate, PageRequest, VehicleStore},
};

/// In-memory vehicle store for tests and single-process runs.
///
/// Every operation takes the map lock once, which gives the same atomicity as
/// the conditional updates of the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryVehicleStore {
    vehicles: Arc<RwLock<BTreeMap<VehicleId, Vehicle>>>,
}

impl InMemoryVehicleStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given vehicles.
    pub fn with_vehicles(vehicles: impl IntoIterator<Item = Vehicle>) -> Self {
        let map = vehicles.into_iter().map(|v| (v.id.clone(), v)).collect();
        Self {
            vehicles: Arc::new(RwLock::new(map)),
        }
    }

    /// Returns the number of vehicles stored.
    pub async fn vehicle_count(&self) -> usize {
        self.vehicles.read().await.len()
    }
}

#[async_trait]
impl VehicleStore for InMemoryVehicleStore {
    async fn get(&self, id: &VehicleId) -> Result<Vehicle> {
        self.vehicles
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::VehicleNotFound(id.clone()))
    }

    async fn list(&self, page: &PageRequest) -> Result<Vec<Vehicle>> {
        let vehicles = self.vehicles.read().await;
        let limit = page.limit as usize;
        let rows: Vec<Vehicle> = match &page.cursor {
            None => vehicles.values().rev().take(limit).cloned().collect(),
            Some(cursor) => vehicles
                .range(..=cursor.clone())
                .rev()
                .take(limit)
                .map(|(_, v)| v.clone())
                .collect(),
        };
        Ok(rows)
    }

    async fn lock(&self, id: &VehicleId) -> Result<Vehicle> {
        let mut vehicles = self.vehicles.write().await;
        let vehicle = vehicles
            .get_mut(id)
            .ok_or_else(|| StoreError::VehicleNotFound(id.clone()))?;

        if !vehicle.is_available() {
            return Err(StoreError::VehicleInUse(id.clone()));
        }
        vehicle.status = VehicleStatus::InUse;
        Ok(vehicle.clone())
    }

    async fn unlock(&self, id: &VehicleId) -> Result<Vehicle> {
        let mut vehicles = self.vehicles.write().await;
        let vehicle = vehicles
            .get_mut(id)
            .ok_or_else(|| StoreError::VehicleNotFound(id.clone()))?;
        vehicle.status = VehicleStatus::Available;
        Ok(vehicle.clone())
    }

    async fn update_location(
        &self,
        id: &VehicleId,
        location: Coordinates,
        recorded_at: DateTime<Utc>,
    ) -> Result<LocationUpdate> {
        let recorded_at = storage_precision(recorded_at);
        let mut vehicles = self.vehicles.write().await;
        let vehicle = vehicles
            .get_mut(id)
            .ok_or_else(|| StoreError::VehicleNotFound(id.clone()))?;

        if vehicle
            .location_updated_at
            .is_some_and(|current| current >= recorded_at)
        {
            return Ok(LocationUpdate::Stale);
        }
        vehicle.location = location;
        vehicle.location_updated_at = Some(recorded_at);
        Ok(LocationUpdate::Applied)
    }

    async fn create_vehicles(&self, vehicles: Vec<Vehicle>) -> Result<Vec<Vehicle>> {
        let mut store = self.vehicles.write().await;
        let mut created = Vec::with_capacity(vehicles.len());
        for vehicle in vehicles {
            if store.contains_key(&vehicle.id) {
                continue;
            }
            store.insert(vehicle.id.clone(), vehicle.clone());
            created.push(vehicle);
        }
        Ok(created)
    }
}

/// In-memory trip store.
///
/// When built with [`InMemoryTripStore::with_shared_vehicles`] it flips the
/// vehicle status inside create/end, mirroring a trip service that shares
/// its database with the vehicle service. The trips lock is always taken
/// before the vehicles lock.
#[derive(Clone, Default)]
pub struct InMemoryTripStore {
    trips: Arc<RwLock<HashMap<TripId, Trip>>>,
    vehicles: Option<InMemoryVehicleStore>,
}

impl InMemoryTripStore {
    /// Creates a new empty store that leaves vehicle status alone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that locks and unlocks vehicles in `vehicles` as part
    /// of its trip transactions.
    pub fn with_shared_vehicles(vehicles: InMemoryVehicleStore) -> Self {
        Self {
            trips: Arc::default(),
            vehicles: Some(vehicles),
        }
    }

    /// Returns the number of trips stored.
    pub async fn trip_count(&self) -> usize {
        self.trips.read().await.len()
    }

    /// Returns the active trip for a vehicle, if any.
    pub async fn active_trip_for(&self, vehicle_id: &VehicleId) -> Option<Trip> {
        self.trips
            .read()
            .await
            .values()
            .find(|t| &t.vehicle_id == vehicle_id && t.status.is_active())
            .map(sorted)
    }
}

fn sorted(trip: &Trip) -> Trip {
    let mut trip = trip.clone();
    trip.locations.sort_by_key(|l| l.recorded_at);
    trip
}

#[async_trait]
impl TripStore for InMemoryTripStore {
    async fn create_trip(
        &self,
        trip_id: TripId,
        vehicle_id: &VehicleId,
        location: Coordinates,
        started_at: DateTime<Utc>,
    ) -> Result<Trip> {
        let started_at = storage_precision(started_at);
        let mut trips = self.trips.write().await;

        if trips.contains_key(&trip_id) {
            return Err(StoreError::Corrupt(format!("duplicate trip id {trip_id}")));
        }
        if trips
            .values()
            .any(|t| &t.vehicle_id == vehicle_id && t.status.is_active())
        {
            return Err(StoreError::VehicleInUse(vehicle_id.clone()));
        }

        if let Some(shared) = &self.vehicles {
            let mut vehicles = shared.vehicles.write().await;
            let vehicle = vehicles
                .get_mut(vehicle_id)
                .ok_or_else(|| StoreError::VehicleNotFound(vehicle_id.clone()))?;
            vehicle.status = VehicleStatus::InUse;
        }

        let trip = Trip {
            id: trip_id,
            status: TripStatus::Active,
            vehicle_id: vehicle_id.clone(),
            locations: vec![Location::new(location, started_at)],
            started_at,
            ended_at: None,
        };
        trips.insert(trip_id, trip.clone());
        Ok(trip)
    }

    async fn end_trip(
        &self,
        trip_id: TripId,
        location: Coordinates,
        ended_at: DateTime<Utc>,
    ) -> Result<Trip> {
        let ended_at = storage_precision(ended_at);
        let mut trips = self.trips.write().await;
        let trip = trips
            .get_mut(&trip_id)
            .ok_or(StoreError::TripNotFound(trip_id))?;

        if !trip.status.is_active() {
            return Err(StoreError::TripNotActive(trip_id));
        }

        if let Some(shared) = &self.vehicles {
            let mut vehicles = shared.vehicles.write().await;
            let vehicle = vehicles
                .get_mut(&trip.vehicle_id)
                .ok_or_else(|| StoreError::VehicleNotFound(trip.vehicle_id.clone()))?;
            vehicle.status = VehicleStatus::Available;
        }

        trip.status = TripStatus::Ended;
        trip.ended_at = Some(ended_at);
        if !trip.locations.iter().any(|l| l.recorded_at == ended_at) {
            trip.locations.push(Location::new(location, ended_at));
        }
        Ok(sorted(trip))
    }

    async fn add_location(
        &self,
        trip_id: TripId,
        location: Coordinates,
        recorded_at: DateTime<Utc>,
    ) -> Result<LocationAppend> {
        let recorded_at = storage_precision(recorded_at);
        let mut trips = self.trips.write().await;
        let trip = trips
            .get_mut(&trip_id)
            .ok_or(StoreError::TripNotFound(trip_id))?;

        if !trip.status.is_active() {
            return Err(StoreError::TripNotActive(trip_id));
        }
        if trip.locations.iter().any(|l| l.recorded_at == recorded_at) {
            return Ok(LocationAppend::Duplicate);
        }
        trip.locations.push(Location::new(location, recorded_at));
        Ok(LocationAppend::Appended)
    }

    async fn get_trip(&self, trip_id: TripId) -> Result<Trip> {
        self.trips
            .read()
            .await
            .get(&trip_id)
            .map(sorted)
            .ok_or(StoreError::TripNotFound(trip_id))
    }

    async fn locations_for_trip(&self, trip_id: TripId) -> Result<Vec<Location>> {
        Ok(self.get_trip(trip_id).await?.locations)
    }
}
