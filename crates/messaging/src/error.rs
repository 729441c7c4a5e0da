use thiserror::Error;

/// Errors raised by a message bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The message could not be handed to the broker.
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Subscribing failed, or the subscription stream broke.
    #[error("Subscription to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Acknowledging a delivery failed.
    #[error("Acknowledge failed: {0}")]
    Ack(String),

    /// A payload could not be encoded.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The configured backend is not compiled in.
    #[error("Bus backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
