//! Saga and peer client error types.

use common::{ErrorCode, SagaId};
use domain::DomainError;
use thiserror::Error;

/// Errors returned by a call to the vehicle or trip service.
///
/// Peer 4xx answers keep their kind so the gateway can answer with the same
/// status; everything else is a failure of the peer or of the network.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already in use: {0}")]
    AlreadyInUse(String),

    #[error("Trip is not active: {0}")]
    TripNotActive(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The peer answered success with a missing or undecodable body.
    #[error("Empty or malformed response body from {service}")]
    EmptyResponseBody { service: &'static str },

    /// The peer answered with an unexpected status.
    #[error("{service} answered {status}: {message}")]
    Peer {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The peer could not be reached.
    #[error("{service} unreachable: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// A client was configured with an unusable base URL.
    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// An in-process service failed internally.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Builds the error for a non-success peer answer.
    pub fn from_status(
        service: &'static str,
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    ) -> Self {
        match (status, code) {
            (404, _) => ClientError::NotFound(message),
            (409, Some(ErrorCode::TripNotActive)) => ClientError::TripNotActive(message),
            (409, _) => ClientError::AlreadyInUse(message),
            (400, _) => ClientError::Validation(message),
            _ => ClientError::Peer {
                service,
                status,
                message,
            },
        }
    }
}

impl From<DomainError> for ClientError {
    fn from(err: DomainError) -> Self {
        let message = err.to_string();
        match err {
            DomainError::VehicleNotFound(_) | DomainError::TripNotFound(_) => {
                ClientError::NotFound(message)
            }
            DomainError::AlreadyInUse(_) => ClientError::AlreadyInUse(message),
            DomainError::TripNotActive(_) => ClientError::TripNotActive(message),
            DomainError::Validation(m) => ClientError::Validation(m),
            DomainError::Store(_) => ClientError::Internal(message),
        }
    }
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step failed; the peer's error is surfaced unchanged.
    #[error(transparent)]
    Step(#[from] ClientError),

    /// The request was rejected before a saga started.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// No reconciliation item is pending for the saga.
    #[error("No reconciliation pending for saga {0}")]
    NothingToReconcile(SagaId),

    /// The journal refused an event.
    #[error("Saga journal error: {0}")]
    Journal(String),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
