pub mod gateway;
pub mod health;
pub mod metrics;
pub mod trips;
pub mod vehicles;
