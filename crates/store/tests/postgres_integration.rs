//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, DurationRound, Utc};
use common::{Coordinates, TripId, TripStatus, Vehicle, VehicleId, VehicleStatus};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    LocationAppend, LocationUpdate, PageRequest, PostgresTripStore, PostgresVehicleStore,
    StoreError, TripStore, VehicleStore, storage_precision,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            store::run_migrations(&temp_pool).await.unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh pool with cleared tables
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE locations, trips, vehicles")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

/// Postgres keeps microseconds; truncate so round-tripped timestamps compare equal.
fn now() -> chrono::DateTime<Utc> {
    Utc::now()
        .duration_trunc(Duration::microseconds(1))
        .unwrap()
}

async fn seed(store: &PostgresVehicleStore, ids: &[&str]) {
    store
        .create_vehicles(
            ids.iter()
                .map(|id| Vehicle::available(*id, Coordinates::new(0.0, 0.0)))
                .collect(),
        )
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
async fn test_lock_is_conditional() {
    let vehicles = PostgresVehicleStore::new(get_test_pool().await);
    seed(&vehicles, &["v1"]).await;
    let id = VehicleId::new("v1");

    let locked = vehicles.lock(&id).await.unwrap();
    assert_eq!(locked.status, VehicleStatus::InUse);

    let again = vehicles.lock(&id).await;
    assert!(matches!(again, Err(StoreError::VehicleInUse(_))));

    let missing = vehicles.lock(&VehicleId::new("ghost")).await;
    assert!(matches!(missing, Err(StoreError::VehicleNotFound(_))));
}

#[tokio::test]
#[serial]
async fn test_concurrent_locks_have_one_winner() {
    let vehicles = PostgresVehicleStore::new(get_test_pool().await);
    seed(&vehicles, &["v1"]).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = vehicles.clone();
            tokio::spawn(async move { store.lock(&VehicleId::new("v1")).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(StoreError::VehicleInUse(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
#[serial]
async fn test_unlock_is_idempotent() {
    let vehicles = PostgresVehicleStore::new(get_test_pool().await);
    seed(&vehicles, &["v1"]).await;
    let id = VehicleId::new("v1");

    let unlocked = vehicles.unlock(&id).await.unwrap();
    assert_eq!(unlocked.status, VehicleStatus::Available);

    vehicles.lock(&id).await.unwrap();
    let unlocked = vehicles.unlock(&id).await.unwrap();
    assert_eq!(unlocked.status, VehicleStatus::Available);

    let missing = vehicles.unlock(&VehicleId::new("ghost")).await;
    assert!(matches!(missing, Err(StoreError::VehicleNotFound(_))));
}

#[tokio::test]
#[serial]
async fn test_list_pagination() {
    let vehicles = PostgresVehicleStore::new(get_test_pool().await);
    seed(&vehicles, &["a", "b", "c", "d", "e"]).await;

    let first = vehicles
        .list(&PageRequest::new(None, Some(2)))
        .await
        .unwrap();
    let ids: Vec<&str> = first.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, ["e", "d"]);

    let next = vehicles
        .list(&PageRequest::new(Some("c".to_string()), Some(2)))
        .await
        .unwrap();
    let ids: Vec<&str> = next.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, ["c", "b"]);

    let all = vehicles.list(&PageRequest::first()).await.unwrap();
    assert_eq!(all.len(), 5);
}

#[tokio::test]
#[serial]
async fn test_update_location_ignores_stale_samples() {
    let vehicles = PostgresVehicleStore::new(get_test_pool().await);
    seed(&vehicles, &["v1"]).await;
    let id = VehicleId::new("v1");
    let at = now();

    let applied = vehicles
        .update_location(&id, Coordinates::new(1.0, 1.0), at)
        .await
        .unwrap();
    assert_eq!(applied, LocationUpdate::Applied);

    let stale = vehicles
        .update_location(&id, Coordinates::new(9.0, 9.0), at - Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(stale, LocationUpdate::Stale);

    let vehicle = vehicles.get(&id).await.unwrap();
    assert_eq!(vehicle.location, Coordinates::new(1.0, 1.0));

    let missing = vehicles
        .update_location(&VehicleId::new("ghost"), Coordinates::new(0.0, 0.0), at)
        .await;
    assert!(matches!(missing, Err(StoreError::VehicleNotFound(_))));
}

#[tokio::test]
#[serial]
async fn test_trip_lifecycle_orders_history() {
    let pool = get_test_pool().await;
    let trips = PostgresTripStore::new(pool);
    let trip_id = TripId::new();
    let vehicle = VehicleId::new("v1");
    let start = now();

    let trip = trips
        .create_trip(trip_id, &vehicle, Coordinates::new(1.0, 2.0), start)
        .await
        .unwrap();
    assert_eq!(trip.status, TripStatus::Active);

    // Inserted out of order
    trips
        .add_location(trip_id, Coordinates::new(1.2, 2.2), start + Duration::seconds(20))
        .await
        .unwrap();
    trips
        .add_location(trip_id, Coordinates::new(1.1, 2.1), start + Duration::seconds(10))
        .await
        .unwrap();

    let ended = trips
        .end_trip(trip_id, Coordinates::new(1.5, 2.5), start + Duration::seconds(30))
        .await
        .unwrap();

    assert_eq!(ended.status, TripStatus::Ended);
    let lats: Vec<f64> = ended.locations.iter().map(|l| l.lat).collect();
    assert_eq!(lats, [1.0, 1.1, 1.2, 1.5]);

    let loaded = trips.get_trip(trip_id).await.unwrap();
    assert_eq!(loaded, ended);
}

#[tokio::test]
#[serial]
async fn test_created_trip_matches_stored_trip() {
    let pool = get_test_pool().await;
    let trips = PostgresTripStore::new(pool);
    let trip_id = TripId::new();
    // Nanosecond precision, finer than the column keeps
    let start = Utc::now();

    let created = trips
        .create_trip(trip_id, &VehicleId::new("v1"), Coordinates::new(1.0, 2.0), start)
        .await
        .unwrap();
    let loaded = trips.get_trip(trip_id).await.unwrap();

    assert_eq!(created, loaded);
    assert_eq!(created.started_at, storage_precision(start));
}

#[tokio::test]
#[serial]
async fn test_final_location_keeps_existing_sample() {
    let pool = get_test_pool().await;
    let trips = PostgresTripStore::new(pool);
    let trip_id = TripId::new();
    let start = now();
    trips
        .create_trip(trip_id, &VehicleId::new("v1"), Coordinates::new(0.0, 0.0), start)
        .await
        .unwrap();

    let end = start + Duration::seconds(10);
    trips
        .add_location(trip_id, Coordinates::new(5.0, 5.0), end)
        .await
        .unwrap();
    let ended = trips
        .end_trip(trip_id, Coordinates::new(6.0, 6.0), end)
        .await
        .unwrap();

    let lats: Vec<f64> = ended.locations.iter().map(|l| l.lat).collect();
    assert_eq!(lats, [0.0, 5.0]);
}

#[tokio::test]
#[serial]
async fn test_add_location_is_idempotent() {
    let trips = PostgresTripStore::new(get_test_pool().await);
    let trip_id = TripId::new();
    let start = now();
    trips
        .create_trip(trip_id, &"v1".into(), Coordinates::new(0.0, 0.0), start)
        .await
        .unwrap();

    let at = start + Duration::seconds(1);
    let first = trips
        .add_location(trip_id, Coordinates::new(1.0, 1.0), at)
        .await
        .unwrap();
    let second = trips
        .add_location(trip_id, Coordinates::new(1.0, 1.0), at)
        .await
        .unwrap();

    assert_eq!(first, LocationAppend::Appended);
    assert_eq!(second, LocationAppend::Duplicate);
    assert_eq!(trips.locations_for_trip(trip_id).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn test_ended_trip_is_final() {
    let trips = PostgresTripStore::new(get_test_pool().await);
    let trip_id = TripId::new();
    let start = now();
    trips
        .create_trip(trip_id, &"v1".into(), Coordinates::new(0.0, 0.0), start)
        .await
        .unwrap();
    trips
        .end_trip(trip_id, Coordinates::new(1.0, 1.0), start + Duration::seconds(1))
        .await
        .unwrap();

    let again = trips
        .end_trip(trip_id, Coordinates::new(1.0, 1.0), start + Duration::seconds(2))
        .await;
    assert!(matches!(again, Err(StoreError::TripNotActive(_))));

    let append = trips
        .add_location(trip_id, Coordinates::new(1.0, 1.0), start + Duration::seconds(3))
        .await;
    assert!(matches!(append, Err(StoreError::TripNotActive(_))));

    let unknown = trips
        .end_trip(TripId::new(), Coordinates::new(1.0, 1.0), now())
        .await;
    assert!(matches!(unknown, Err(StoreError::TripNotFound(_))));
}

#[tokio::test]
#[serial]
async fn test_second_active_trip_for_vehicle_is_rejected() {
    let trips = PostgresTripStore::new(get_test_pool().await);
    let vehicle = VehicleId::new("v1");

    trips
        .create_trip(TripId::new(), &vehicle, Coordinates::new(0.0, 0.0), now())
        .await
        .unwrap();
    let second = trips
        .create_trip(TripId::new(), &vehicle, Coordinates::new(0.0, 0.0), now())
        .await;

    assert!(matches!(second, Err(StoreError::VehicleInUse(_))));
}

#[tokio::test]
#[serial]
async fn test_shared_store_transactions_update_vehicle() {
    let pool = get_test_pool().await;
    let vehicles = PostgresVehicleStore::new(pool.clone());
    let trips = PostgresTripStore::with_shared_vehicles(pool);
    seed(&vehicles, &["v1"]).await;
    let id = VehicleId::new("v1");
    let trip_id = TripId::new();

    trips
        .create_trip(trip_id, &id, Coordinates::new(0.0, 0.0), now())
        .await
        .unwrap();
    assert_eq!(vehicles.get(&id).await.unwrap().status, VehicleStatus::InUse);

    trips
        .end_trip(trip_id, Coordinates::new(1.0, 1.0), now())
        .await
        .unwrap();
    assert_eq!(
        vehicles.get(&id).await.unwrap().status,
        VehicleStatus::Available
    );
}

#[tokio::test]
#[serial]
async fn test_shared_store_rolls_back_on_unknown_vehicle() {
    let pool = get_test_pool().await;
    let trips = PostgresTripStore::with_shared_vehicles(pool.clone());
    let trip_id = TripId::new();

    let result = trips
        .create_trip(trip_id, &"ghost".into(), Coordinates::new(0.0, 0.0), now())
        .await;
    assert!(matches!(result, Err(StoreError::VehicleNotFound(_))));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trips")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert!(matches!(
        trips.get_trip(trip_id).await,
        Err(StoreError::TripNotFound(_))
    ));
}
