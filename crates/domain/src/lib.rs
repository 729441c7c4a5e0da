//! Domain layer for the fleet trip services.
//!
//! This crate provides:
//! - Commands with validation (`StartTrip`, `EndTrip`, `TrackLocation`)
//! - `VehicleService`: conditional lock/unlock, listing, positions
//! - `TripService`: transactional trip start/end and location appends
//! - The `DomainError` taxonomy shared by the HTTP layer and the saga

pub mod command;
pub mod error;
pub mod trip_service;
pub mod vehicle_service;

pub use command::{Command, EndTrip, StartTrip, TrackLocation};
pub use error::DomainError;
pub use trip_service::TripService;
pub use vehicle_service::VehicleService;
