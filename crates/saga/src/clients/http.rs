use std::time::Duration;

use async_trait::async_trait;
use common::{
    Coordinates, EndTripRequest, ErrorBody, StartTripRequest, Trip, TripId, Vehicle, VehicleId,
};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use store::PageRequest;

use super::{TRIP_SERVICE, TripClient, VEHICLE_SERVICE, VehicleClient};
use crate::error::ClientError;

/// Base URL plus a shared reqwest client.
#[derive(Debug, Clone)]
struct Endpoint {
    service: &'static str,
    base: Url,
    client: Client,
}

impl Endpoint {
    fn new(service: &'static str, base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };
        let base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            service,
            base,
            client,
        })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn transport(&self, err: reqwest::Error) -> ClientError {
        ClientError::Transport {
            service: self.service,
            message: err.to_string(),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await.map_err(|e| self.transport(e))?;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, ClientError> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.transport(e))?;

        if status.is_success() {
            if body.is_empty() {
                return Err(ClientError::EmptyResponseBody {
                    service: self.service,
                });
            }
            return serde_json::from_slice(&body).map_err(|e| {
                tracing::warn!(service = self.service, error = %e, "undecodable peer response");
                ClientError::EmptyResponseBody {
                    service: self.service,
                }
            });
        }

        let (message, code) = match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(error) => (error.message, error.code),
            Err(_) => (
                status.canonical_reason().unwrap_or("unknown error").to_string(),
                None,
            ),
        };
        Err(ClientError::from_status(
            self.service,
            status.as_u16(),
            code,
            message,
        ))
    }
}

/// Vehicle service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpVehicleClient {
    endpoint: Endpoint,
}

impl HttpVehicleClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            endpoint: Endpoint::new(VEHICLE_SERVICE, base_url, timeout)?,
        })
    }
}

#[async_trait]
impl VehicleClient for HttpVehicleClient {
    #[tracing::instrument(skip(self))]
    async fn get_vehicle(&self, id: &VehicleId) -> Result<Vehicle, ClientError> {
        let url = self.endpoint.url(&["vehicle", id.as_str()]);
        self.endpoint.send(self.endpoint.client.get(url)).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_vehicles(&self, page: &PageRequest) -> Result<Vec<Vehicle>, ClientError> {
        let url = self.endpoint.url(&["vehicles"]);
        let mut query = vec![("limit", page.limit.to_string())];
        if let Some(cursor) = &page.cursor {
            query.push(("cursor", cursor.to_string()));
        }
        self.endpoint
            .send(self.endpoint.client.get(url).query(&query))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn lock(&self, id: &VehicleId) -> Result<Vehicle, ClientError> {
        let url = self.endpoint.url(&["lock", id.as_str()]);
        self.endpoint.send(self.endpoint.client.get(url)).await
    }

    #[tracing::instrument(skip(self))]
    async fn unlock(&self, id: &VehicleId) -> Result<Vehicle, ClientError> {
        let url = self.endpoint.url(&["unlock", id.as_str()]);
        self.endpoint.send(self.endpoint.client.get(url)).await
    }
}

/// Trip service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTripClient {
    endpoint: Endpoint,
}

impl HttpTripClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            endpoint: Endpoint::new(TRIP_SERVICE, base_url, timeout)?,
        })
    }
}

#[async_trait]
impl TripClient for HttpTripClient {
    #[tracing::instrument(skip(self))]
    async fn start_trip(
        &self,
        vehicle_id: &VehicleId,
        location: Coordinates,
    ) -> Result<Trip, ClientError> {
        let url = self.endpoint.url(&["trip", "start"]);
        let body = StartTripRequest {
            vehicle_id: vehicle_id.clone(),
            location,
        };
        self.endpoint
            .send(self.endpoint.client.post(url).json(&body))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn end_trip(&self, trip_id: TripId, location: Coordinates) -> Result<Trip, ClientError> {
        let url = self.endpoint.url(&["trip", "end"]);
        let body = EndTripRequest { trip_id, location };
        self.endpoint
            .send(self.endpoint.client.post(url).json(&body))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn get_trip(&self, trip_id: TripId) -> Result<Trip, ClientError> {
        let id = trip_id.to_string();
        let url = self.endpoint.url(&["trip", &id]);
        self.endpoint.send(self.endpoint.client.get(url)).await
    }
}
