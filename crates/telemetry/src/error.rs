//! Telemetry consumer error types.

use thiserror::Error;

/// Errors that stop a telemetry consumer.
///
/// Per-message failures never surface here; they are logged, counted and
/// acknowledged.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Subscribing failed or the subscription broke.
    #[error("Bus error: {0}")]
    Bus(#[from] messaging::BusError),

    /// The subscription stream ended while the consumer was still running.
    #[error("Subscription to {0} ended unexpectedly")]
    StreamEnded(String),

    /// A dead letter could not be encoded.
    #[error("Dead letter encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;
