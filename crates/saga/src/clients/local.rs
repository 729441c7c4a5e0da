use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{Coordinates, IdGenerator, Trip, TripId, Vehicle, VehicleId};
use domain::{EndTrip, StartTrip, TripService, VehicleService};
use store::{PageRequest, TripStore, VehicleStore};

use super::{TRIP_SERVICE, TripClient, VEHICLE_SERVICE, VehicleClient};
use crate::error::ClientError;

fn outage(service: &'static str) -> ClientError {
    ClientError::Transport {
        service,
        message: "injected failure".to_string(),
    }
}

/// In-process vehicle service with switchable failures.
pub struct LocalVehicleClient<S: VehicleStore> {
    service: VehicleService<S>,
    fail_on_lock: Arc<AtomicBool>,
    fail_on_unlock: Arc<AtomicBool>,
}

impl<S: VehicleStore + Clone> Clone for LocalVehicleClient<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            fail_on_lock: Arc::clone(&self.fail_on_lock),
            fail_on_unlock: Arc::clone(&self.fail_on_unlock),
        }
    }
}

impl<S: VehicleStore> LocalVehicleClient<S> {
    pub fn new(service: VehicleService<S>) -> Self {
        Self {
            service,
            fail_on_lock: Arc::default(),
            fail_on_unlock: Arc::default(),
        }
    }

    pub fn service(&self) -> &VehicleService<S> {
        &self.service
    }

    /// Makes every lock call fail as if the service were unreachable.
    pub fn set_fail_on_lock(&self, fail: bool) {
        self.fail_on_lock.store(fail, Ordering::SeqCst);
    }

    /// Makes every unlock call fail as if the service were unreachable.
    pub fn set_fail_on_unlock(&self, fail: bool) {
        self.fail_on_unlock.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: VehicleStore> VehicleClient for LocalVehicleClient<S> {
    async fn get_vehicle(&self, id: &VehicleId) -> Result<Vehicle, ClientError> {
        Ok(self.service.get(id).await?)
    }

    async fn list_vehicles(&self, page: &PageRequest) -> Result<Vec<Vehicle>, ClientError> {
        Ok(self.service.list(page).await?)
    }

    async fn lock(&self, id: &VehicleId) -> Result<Vehicle, ClientError> {
        if self.fail_on_lock.load(Ordering::SeqCst) {
            return Err(outage(VEHICLE_SERVICE));
        }
        Ok(self.service.lock(id).await?)
    }

    async fn unlock(&self, id: &VehicleId) -> Result<Vehicle, ClientError> {
        if self.fail_on_unlock.load(Ordering::SeqCst) {
            return Err(outage(VEHICLE_SERVICE));
        }
        Ok(self.service.unlock(id).await?)
    }
}

/// In-process trip service with switchable failures.
pub struct LocalTripClient<S: TripStore, G: IdGenerator> {
    service: TripService<S, G>,
    fail_on_create: Arc<AtomicBool>,
    fail_on_end: Arc<AtomicBool>,
}

impl<S: TripStore + Clone, G: IdGenerator + Clone> Clone for LocalTripClient<S, G> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            fail_on_create: Arc::clone(&self.fail_on_create),
            fail_on_end: Arc::clone(&self.fail_on_end),
        }
    }
}

impl<S: TripStore, G: IdGenerator> LocalTripClient<S, G> {
    pub fn new(service: TripService<S, G>) -> Self {
        Self {
            service,
            fail_on_create: Arc::default(),
            fail_on_end: Arc::default(),
        }
    }

    pub fn service(&self) -> &TripService<S, G> {
        &self.service
    }

    /// Makes every start call fail before anything is written.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Makes every end call fail before anything is written.
    pub fn set_fail_on_end(&self, fail: bool) {
        self.fail_on_end.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: TripStore, G: IdGenerator> TripClient for LocalTripClient<S, G> {
    async fn start_trip(
        &self,
        vehicle_id: &VehicleId,
        location: Coordinates,
    ) -> Result<Trip, ClientError> {
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(outage(TRIP_SERVICE));
        }
        Ok(self
            .service
            .start_trip(StartTrip::new(vehicle_id.clone(), location))
            .await?)
    }

    async fn end_trip(&self, trip_id: TripId, location: Coordinates) -> Result<Trip, ClientError> {
        if self.fail_on_end.load(Ordering::SeqCst) {
            return Err(outage(TRIP_SERVICE));
        }
        Ok(self.service.end_trip(EndTrip::new(trip_id, location)).await?)
    }

    async fn get_trip(&self, trip_id: TripId) -> Result<Trip, ClientError> {
        Ok(self.service.get_trip(trip_id).await?)
    }
}
