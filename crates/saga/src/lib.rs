//! Trip lifecycle saga.
//!
//! The vehicle and the trip live in two services that cannot commit
//! together. The coordinator runs each lifecycle transition as a saga:
//!
//! Start trip:
//! 1. Lock the vehicle
//! 2. Create the trip (compensated by unlocking the vehicle)
//!
//! End trip:
//! 1. End the trip
//! 2. Unlock the vehicle (never compensated; failures go to the
//!    reconciliation queue)
//!
//! Every saga is journaled so a failure halfway through can be diagnosed.

pub mod aggregate;
pub mod clients;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod journal;
pub mod reconciliation;
pub mod state;
pub mod trip_lifecycle;

pub use aggregate::SagaInstance;
pub use clients::http::{HttpTripClient, HttpVehicleClient};
pub use clients::local::{LocalTripClient, LocalVehicleClient};
pub use clients::{TRIP_SERVICE, TripClient, VEHICLE_SERVICE, VehicleClient};
pub use coordinator::{SagaOutcome, TripSagaCoordinator};
pub use error::{ClientError, Result, SagaError};
pub use events::SagaEvent;
pub use journal::{DEFAULT_JOURNAL_CAPACITY, InMemorySagaJournal, SagaJournal};
pub use reconciliation::{ReconciliationItem, ReconciliationQueue};
pub use state::SagaState;
pub use trip_lifecycle::SagaKind;
