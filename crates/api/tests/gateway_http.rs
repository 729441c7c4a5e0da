//! Gateway talking to real vehicle and trip services over HTTP.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::routes::gateway::GatewayState;
use api::routes::trips::TripState;
use api::routes::vehicles::VehicleState;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use common::{Coordinates, DEFAULT_TELEMETRY_TOPIC, TimeOrderedIds, Vehicle, VehicleId};
use domain::{TripService, VehicleService};
use messaging::InMemoryBus;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    HttpTripClient, HttpVehicleClient, InMemorySagaJournal, ReconciliationQueue,
    TripSagaCoordinator,
};
use serde_json::{Value, json};
use store::{InMemoryTripStore, InMemoryVehicleStore, VehicleStore};
use tokio::net::TcpListener;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn gateway_for(vehicle_url: &str, trip_url: &str) -> Router {
    let timeout = Duration::from_secs(2);
    let state = Arc::new(GatewayState {
        coordinator: TripSagaCoordinator::new(
            HttpVehicleClient::new(vehicle_url, timeout).unwrap(),
            HttpTripClient::new(trip_url, timeout).unwrap(),
            InMemorySagaJournal::new(),
            ReconciliationQueue::new(),
        ),
        publisher: Arc::new(InMemoryBus::new()),
        telemetry_topic: DEFAULT_TELEMETRY_TOPIC.to_string(),
    });
    api::create_gateway_app(state, get_metrics_handle())
}

struct Deployment {
    gateway: Router,
    vehicles: InMemoryVehicleStore,
}

async fn deploy() -> Deployment {
    let vehicles = InMemoryVehicleStore::with_vehicles([
        Vehicle::available("V1", Coordinates::new(0.0, 0.0)),
        Vehicle::available("V2", Coordinates::new(0.0, 0.0)),
    ]);
    let vehicle_app = api::create_vehicle_app(
        Arc::new(VehicleState {
            vehicles: VehicleService::new(vehicles.clone()),
        }),
        get_metrics_handle(),
    );
    let trip_app = api::create_trip_app(
        Arc::new(TripState {
            trips: TripService::new(InMemoryTripStore::new(), TimeOrderedIds),
        }),
        get_metrics_handle(),
    );

    let vehicle_addr = spawn(vehicle_app).await;
    let trip_addr = spawn(trip_app).await;
    Deployment {
        gateway: gateway_for(
            &format!("http://{vehicle_addr}"),
            &format!("http://{trip_addr}"),
        ),
        vehicles,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn status_of(store: &InMemoryVehicleStore, id: &str) -> String {
    store
        .get(&VehicleId::new(id))
        .await
        .unwrap()
        .status
        .as_str()
        .to_string()
}

#[tokio::test]
async fn test_trip_lifecycle_over_http() {
    let d = deploy().await;

    let (status, trip) = call(
        &d.gateway,
        "POST",
        "/trip/start",
        Some(json!({"vehicle_id": "V1", "location": {"lat": 1.0, "lng": 2.0}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(trip["locations"], json!([{"lat": 1.0, "lng": 2.0, "recorded_at": trip["started_at"]}]));
    assert_eq!(status_of(&d.vehicles, "V1").await, "in_use");

    let (status, ended) = call(
        &d.gateway,
        "POST",
        "/trip/end",
        Some(json!({"trip_id": trip["id"], "location": {"lat": 1.5, "lng": 2.5}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["status"], "ended");
    let coords: Vec<(f64, f64)> = ended["locations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| (l["lat"].as_f64().unwrap(), l["lng"].as_f64().unwrap()))
        .collect();
    assert_eq!(coords, [(1.0, 2.0), (1.5, 2.5)]);
    assert_eq!(status_of(&d.vehicles, "V1").await, "available");
}

#[tokio::test]
async fn test_peer_client_errors_keep_their_status() {
    let d = deploy().await;

    let (status, json) = call(&d.gateway, "GET", "/vehicle/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "not_found");

    let start = json!({"vehicle_id": "V2", "location": {"lat": 1.0, "lng": 2.0}});
    let (status, trip) = call(&d.gateway, "POST", "/trip/start", Some(start.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = call(&d.gateway, "POST", "/trip/start", Some(start)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "already_in_use");

    let end = json!({"trip_id": trip["id"], "location": {"lat": 1.5, "lng": 2.5}});
    let (status, _) = call(&d.gateway, "POST", "/trip/end", Some(end.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&d.gateway, "POST", "/trip/end", Some(end)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "trip_not_active");
}

#[tokio::test]
async fn test_vehicle_listing_is_forwarded() {
    let d = deploy().await;

    let (status, json) = call(&d.gateway, "GET", "/vehicles?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([{"id": "V2", "status": "available", "location": {"lat": 0.0, "lng": 0.0}}]));

    let (_, json) = call(&d.gateway, "GET", "/vehicles?cursor=V1", None).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["id"], "V1");
}

#[tokio::test]
async fn test_empty_peer_body_is_bad_gateway() {
    let stub = Router::new().route("/lock/{id}", get(|| async { StatusCode::OK }));
    let vehicle_addr = spawn(stub).await;
    let gateway = gateway_for(&format!("http://{vehicle_addr}"), "http://127.0.0.1:9");

    let (status, json) = call(
        &gateway,
        "POST",
        "/trip/start",
        Some(json!({"vehicle_id": "V1", "location": {"lat": 1.0, "lng": 2.0}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "bad_gateway");
}

#[tokio::test]
async fn test_unreachable_peer_is_bad_gateway() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = gateway_for(&format!("http://{addr}"), &format!("http://{addr}"));
    let (status, _) = call(&gateway, "GET", "/vehicle/V1", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
