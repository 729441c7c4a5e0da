//! Message bus abstraction for telemetry events.
//!
//! This crate provides:
//! - `Publisher` / `Subscriber` traits with acknowledged `Delivery`s
//! - `InMemoryBus`: single-process fan-out bus used in tests and local runs
//! - `KafkaBus` (feature `kafka`): rdkafka producer and per-group consumers

pub mod bus;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

pub use bus::{
    Acknowledger, Delivery, DeliveryStream, Message, Publisher, Subscriber, consumer_group,
    publish_json,
};
pub use error::{BusError, Result};
#[cfg(feature = "kafka")]
pub use kafka::KafkaBus;
pub use memory::InMemoryBus;
