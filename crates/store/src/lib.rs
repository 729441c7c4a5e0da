//! Vehicle and trip persistence.
//!
//! Two store traits with in-memory and PostgreSQL implementations:
//! - [`VehicleStore`]: conditional lock/unlock and last-known position
//! - [`TripStore`]: transactional trip creation/ending and location history

pub mod error;
pub mod memory;
pub mod postgres;
pub mod trip;
pub mod vehicle;

pub use error::{Result, StoreError};
pub use memory::{InMemoryTripStore, InMemoryVehicleStore};
pub use postgres::{PostgresTripStore, PostgresVehicleStore, run_migrations};
pub use trip::{LocationAppend, TripStore, storage_precision};
pub use vehicle::{DEFAULT_PAGE_SIZE, LocationUpdate, MAX_PAGE_SIZE, PageRequest, VehicleStore};
