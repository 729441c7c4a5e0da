//! Telemetry ingestion for the vehicle and trip services.
//!
//! Each service runs one [`TelemetryConsumer`] with its own handler:
//! - [`VehicleLocationHandler`] overwrites the vehicle's last known position
//! - [`TripLocationHandler`] appends to the trip's location history
//!
//! Deliveries are at-least-once and unordered; consumers deduplicate on the
//! event ID and dead-letter payloads they cannot decode.

pub mod consumer;
pub mod dead_letter;
pub mod dedupe;
pub mod error;
pub mod handler;
pub mod shutdown;

pub use consumer::{ConsumerStats, StatsSnapshot, TelemetryConsumer};
pub use dead_letter::{
    DeadLetter, DeadLetterSink, InMemoryDeadLetters, PublisherDeadLetters, dead_letter_topic,
};
pub use dedupe::{DEFAULT_DEDUPE_WINDOW, Deduplicator};
pub use error::{Result, TelemetryError};
pub use handler::{HandleOutcome, TelemetryHandler, TripLocationHandler, VehicleLocationHandler};
pub use shutdown::{Shutdown, ShutdownTrigger, shutdown_channel};
