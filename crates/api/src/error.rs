//! API error types with HTTP response mapping.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{ErrorBody, ErrorCode};
use domain::DomainError;
use messaging::BusError;
use saga::{ClientError, SagaError};

/// API-level error type that maps to HTTP responses.
///
/// Client errors carry their message to the caller. Server errors are
/// logged with their detail and answered with an opaque message.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Vehicle locked or already on a trip.
    AlreadyInUse(String),
    /// Trip has already ended.
    TripNotActive(String),
    /// Malformed request.
    Validation(String),
    /// A peer service failed or answered garbage.
    BadGateway(String),
    /// Internal server error.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyInUse(_) | ApiError::TripNotActive(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::NotFound(_) => ErrorCode::NotFound,
            ApiError::AlreadyInUse(_) => ErrorCode::AlreadyInUse,
            ApiError::TripNotActive(_) => ErrorCode::TripNotActive,
            ApiError::Validation(_) => ErrorCode::Validation,
            ApiError::BadGateway(_) => ErrorCode::BadGateway,
            ApiError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::AlreadyInUse(msg)
            | ApiError::TripNotActive(msg)
            | ApiError::Validation(msg) => msg,
            ApiError::BadGateway(detail) => {
                tracing::error!(error = %detail, "peer service failure");
                "upstream service failure".to_string()
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal server error");
                "internal server error".to_string()
            }
        };

        let body = ErrorBody {
            message,
            code: Some(code),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let message = err.to_string();
        match err {
            DomainError::VehicleNotFound(_) | DomainError::TripNotFound(_) => {
                ApiError::NotFound(message)
            }
            DomainError::AlreadyInUse(_) => ApiError::AlreadyInUse(message),
            DomainError::TripNotActive(_) => ApiError::TripNotActive(message),
            DomainError::Validation(_) => ApiError::Validation(message),
            DomainError::Store(_) => ApiError::Internal(message),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound(msg) => ApiError::NotFound(msg),
            ClientError::AlreadyInUse(msg) => ApiError::AlreadyInUse(msg),
            ClientError::TripNotActive(msg) => ApiError::TripNotActive(msg),
            ClientError::Validation(msg) => ApiError::Validation(msg),
            err @ (ClientError::EmptyResponseBody { .. }
            | ClientError::Peer { .. }
            | ClientError::Transport { .. }) => ApiError::BadGateway(err.to_string()),
            err @ (ClientError::InvalidBaseUrl { .. } | ClientError::Internal(_)) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::Step(client) => client.into(),
            SagaError::Validation(msg) => ApiError::Validation(msg),
            err @ (SagaError::NotFound(_) | SagaError::NothingToReconcile(_)) => {
                ApiError::NotFound(err.to_string())
            }
            SagaError::Journal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<BusError> for ApiError {
    fn from(err: BusError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{TripId, VehicleId};

    async fn body(err: ApiError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_domain_errors_map_to_status() {
        let cases = [
            (
                DomainError::VehicleNotFound(VehicleId::new("v1")),
                StatusCode::NOT_FOUND,
            ),
            (
                DomainError::AlreadyInUse(VehicleId::new("v1")),
                StatusCode::CONFLICT,
            ),
            (
                DomainError::TripNotActive(TripId::new()),
                StatusCode::CONFLICT,
            ),
            (
                DomainError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                DomainError::Store(store::StoreError::Corrupt("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_peer_failures_are_bad_gateway() {
        let err = ApiError::from(SagaError::Step(ClientError::EmptyResponseBody {
            service: "trip-service",
        }));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);

        let err = ApiError::from(SagaError::Step(ClientError::NotFound("gone".into())));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_client_errors_keep_message() {
        let (status, body) = body(ApiError::AlreadyInUse("Vehicle already in use: v1".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.message, "Vehicle already in use: v1");
        assert_eq!(body.code, Some(ErrorCode::AlreadyInUse));
    }

    #[tokio::test]
    async fn test_server_errors_are_opaque() {
        let (status, body) = body(ApiError::Internal("connection refused at 10.0.0.3".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "internal server error");
    }
}
