//! End-to-end telemetry tests: bus -> consumers -> stores.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use common::{
    Coordinates, DEFAULT_TELEMETRY_TOPIC, TelemetryEvent, TimeOrderedIds, TripId, Vehicle,
    VehicleId,
};
use domain::{EndTrip, StartTrip, TripService, VehicleService};
use messaging::{
    BusError, DeliveryStream, InMemoryBus, Publisher, Subscriber, consumer_group, publish_json,
};
use store::{InMemoryTripStore, InMemoryVehicleStore, TripStore, VehicleStore};
use telemetry::{
    ConsumerStats, InMemoryDeadLetters, ShutdownTrigger, TelemetryConsumer, TelemetryError,
    TripLocationHandler, VehicleLocationHandler, shutdown_channel,
};
use tokio::task::JoinHandle;

struct Pipeline {
    bus: InMemoryBus,
    vehicles: InMemoryVehicleStore,
    trips: TripService<InMemoryTripStore, TimeOrderedIds>,
    dead_letters: InMemoryDeadLetters,
    vehicle_stats: Arc<ConsumerStats>,
    trip_stats: Arc<ConsumerStats>,
    trigger: ShutdownTrigger,
    tasks: Vec<JoinHandle<telemetry::Result<()>>>,
}

impl Pipeline {
    fn start() -> Self {
        let bus = InMemoryBus::new();
        let vehicles = InMemoryVehicleStore::with_vehicles([Vehicle::available(
            "v1",
            Coordinates::new(0.0, 0.0),
        )]);
        let trips = TripService::new(InMemoryTripStore::new(), TimeOrderedIds);
        let dead_letters = InMemoryDeadLetters::new();
        let (trigger, shutdown) = shutdown_channel();

        let vehicle_consumer = TelemetryConsumer::new(
            Arc::new(bus.clone()),
            DEFAULT_TELEMETRY_TOPIC,
            consumer_group("vehicle-service"),
            VehicleLocationHandler::new(VehicleService::new(vehicles.clone())),
            Arc::new(dead_letters.clone()),
        );
        let trip_consumer = TelemetryConsumer::new(
            Arc::new(bus.clone()),
            DEFAULT_TELEMETRY_TOPIC,
            consumer_group("trip-service"),
            TripLocationHandler::new(trips.clone()),
            Arc::new(dead_letters.clone()),
        );
        let vehicle_stats = vehicle_consumer.stats();
        let trip_stats = trip_consumer.stats();

        let tasks = vec![
            tokio::spawn(vehicle_consumer.run(shutdown.clone())),
            tokio::spawn(trip_consumer.run(shutdown)),
        ];

        Self {
            bus,
            vehicles,
            trips,
            dead_letters,
            vehicle_stats,
            trip_stats,
            trigger,
            tasks,
        }
    }

    async fn publish(&self, event: &TelemetryEvent) {
        publish_json(&self.bus, DEFAULT_TELEMETRY_TOPIC, Some(event.key()), event)
            .await
            .unwrap();
    }

    async fn settled(&self, vehicle_side: u64, trip_side: u64) {
        eventually(|| async {
            self.vehicle_stats.snapshot().total() >= vehicle_side
                && self.trip_stats.snapshot().total() >= trip_side
        })
        .await;
    }

    async fn stop(self) {
        self.trigger.trigger();
        for task in self.tasks {
            let result = tokio::time::timeout(Duration::from_secs(2), task)
                .await
                .expect("consumer did not stop")
                .unwrap();
            assert!(result.is_ok());
        }
    }
}

async fn eventually<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

#[tokio::test]
async fn event_reaches_both_services() {
    let pipeline = Pipeline::start();
    let trip = pipeline
        .trips
        .start_trip(StartTrip::new("v1", Coordinates::new(0.0, 0.0)))
        .await
        .unwrap();

    let event = TelemetryEvent::new(trip.id, VehicleId::new("v1"), Coordinates::new(1.0, 2.0));
    pipeline.publish(&event).await;
    pipeline.settled(1, 1).await;

    let vehicle = pipeline.vehicles.get(&VehicleId::new("v1")).await.unwrap();
    assert_eq!(vehicle.location, Coordinates::new(1.0, 2.0));
    assert_eq!(
        vehicle.location_updated_at,
        Some(store::storage_precision(event.recorded_at))
    );

    let locations = pipeline.trips.locations(trip.id).await.unwrap();
    assert_eq!(locations.len(), 2);
    assert_eq!(locations[1].coordinates(), Coordinates::new(1.0, 2.0));

    assert_eq!(pipeline.vehicle_stats.snapshot().applied, 1);
    assert_eq!(pipeline.trip_stats.snapshot().applied, 1);
    pipeline.stop().await;
}

#[tokio::test]
async fn duplicate_delivery_is_applied_once() {
    let pipeline = Pipeline::start();
    let trip = pipeline
        .trips
        .start_trip(StartTrip::new("v1", Coordinates::new(0.0, 0.0)))
        .await
        .unwrap();

    let event = TelemetryEvent::new(trip.id, VehicleId::new("v1"), Coordinates::new(1.0, 1.0));
    pipeline.publish(&event).await;
    pipeline.publish(&event).await;
    pipeline.settled(2, 2).await;

    let trip_stats = pipeline.trip_stats.snapshot();
    assert_eq!(trip_stats.applied, 1);
    assert_eq!(trip_stats.duplicates, 1);
    assert_eq!(pipeline.vehicle_stats.snapshot().duplicates, 1);
    assert_eq!(pipeline.trips.locations(trip.id).await.unwrap().len(), 2);
    pipeline.stop().await;
}

#[tokio::test]
async fn redelivered_sample_with_new_event_id_is_still_idempotent() {
    let pipeline = Pipeline::start();
    let trip = pipeline
        .trips
        .start_trip(StartTrip::new("v1", Coordinates::new(0.0, 0.0)))
        .await
        .unwrap();

    let first = TelemetryEvent::new(trip.id, VehicleId::new("v1"), Coordinates::new(1.0, 1.0));
    let mut replay = TelemetryEvent::new(trip.id, VehicleId::new("v1"), Coordinates::new(1.0, 1.0));
    replay.recorded_at = first.recorded_at;

    pipeline.publish(&first).await;
    pipeline.publish(&replay).await;
    pipeline.settled(2, 2).await;

    assert_eq!(pipeline.trip_stats.snapshot().duplicates, 1);
    assert_eq!(pipeline.vehicle_stats.snapshot().stale, 1);
    assert_eq!(pipeline.trips.locations(trip.id).await.unwrap().len(), 2);
    pipeline.stop().await;
}

#[tokio::test]
async fn older_sample_does_not_move_vehicle_back() {
    let pipeline = Pipeline::start();
    let trip_id = TripId::new();

    let newer = TelemetryEvent::new(trip_id, VehicleId::new("v1"), Coordinates::new(5.0, 5.0));
    let mut older = TelemetryEvent::new(trip_id, VehicleId::new("v1"), Coordinates::new(4.0, 4.0));
    older.recorded_at = newer.recorded_at - ChronoDuration::seconds(30);

    pipeline.publish(&newer).await;
    pipeline.publish(&older).await;
    pipeline.settled(2, 2).await;

    let vehicle = pipeline.vehicles.get(&VehicleId::new("v1")).await.unwrap();
    assert_eq!(vehicle.location, Coordinates::new(5.0, 5.0));
    assert_eq!(pipeline.vehicle_stats.snapshot().stale, 1);
    // unknown trip on the trip side
    assert_eq!(pipeline.trip_stats.snapshot().rejected, 2);
    pipeline.stop().await;
}

#[tokio::test]
async fn malformed_payload_is_dead_lettered_and_consumption_continues() {
    let pipeline = Pipeline::start();
    pipeline
        .bus
        .publish(DEFAULT_TELEMETRY_TOPIC, Some("v1"), b"{\"trip_id\": 12")
        .await
        .unwrap();

    let event = TelemetryEvent::new(TripId::new(), VehicleId::new("v1"), Coordinates::new(3.0, 3.0));
    pipeline.publish(&event).await;
    pipeline.settled(2, 2).await;

    let letters = pipeline.dead_letters.letters().await;
    assert_eq!(letters.len(), 2);
    assert!(letters.iter().all(|l| l.source_topic == DEFAULT_TELEMETRY_TOPIC));
    assert_eq!(pipeline.vehicle_stats.snapshot().dead_lettered, 1);
    assert_eq!(pipeline.vehicle_stats.snapshot().applied, 1);

    let vehicle = pipeline.vehicles.get(&VehicleId::new("v1")).await.unwrap();
    assert_eq!(vehicle.location, Coordinates::new(3.0, 3.0));
    pipeline.stop().await;
}

#[tokio::test]
async fn samples_for_ended_trip_are_rejected() {
    let pipeline = Pipeline::start();
    let trip = pipeline
        .trips
        .start_trip(StartTrip::new("v1", Coordinates::new(0.0, 0.0)))
        .await
        .unwrap();
    pipeline
        .trips
        .end_trip(EndTrip::new(trip.id, Coordinates::new(1.0, 1.0)))
        .await
        .unwrap();

    let mut late = TelemetryEvent::new(trip.id, VehicleId::new("v1"), Coordinates::new(2.0, 2.0));
    late.recorded_at = Utc::now() + ChronoDuration::seconds(1);
    pipeline.publish(&late).await;
    pipeline.settled(1, 1).await;

    assert_eq!(pipeline.trip_stats.snapshot().rejected, 1);
    assert_eq!(pipeline.trips.store().locations_for_trip(trip.id).await.unwrap().len(), 2);
    pipeline.stop().await;
}

#[tokio::test]
async fn consumer_stops_on_shutdown_while_idle() {
    let pipeline = Pipeline::start();
    eventually(|| async { pipeline.bus.group_count(DEFAULT_TELEMETRY_TOPIC).await == 2 }).await;
    pipeline.stop().await;
}

struct BrokenBus;

#[async_trait]
impl Subscriber for BrokenBus {
    async fn subscribe(&self, topic: &str, _group: &str) -> messaging::Result<DeliveryStream> {
        Err(BusError::Subscribe {
            topic: topic.to_string(),
            reason: "broker unreachable".to_string(),
        })
    }
}

struct EndingBus;

#[async_trait]
impl Subscriber for EndingBus {
    async fn subscribe(&self, _topic: &str, _group: &str) -> messaging::Result<DeliveryStream> {
        Ok(Box::pin(futures_util::stream::empty()))
    }
}

fn vehicle_consumer(
    subscriber: Arc<dyn Subscriber>,
) -> TelemetryConsumer<VehicleLocationHandler<InMemoryVehicleStore>> {
    TelemetryConsumer::new(
        subscriber,
        DEFAULT_TELEMETRY_TOPIC,
        "vehicle-service-test",
        VehicleLocationHandler::new(VehicleService::new(InMemoryVehicleStore::new())),
        Arc::new(InMemoryDeadLetters::new()),
    )
}

#[tokio::test]
async fn subscribe_failure_is_fatal() {
    let (_trigger, shutdown) = shutdown_channel();
    let err = vehicle_consumer(Arc::new(BrokenBus))
        .run(shutdown)
        .await
        .unwrap_err();
    assert!(matches!(err, TelemetryError::Bus(_)));
}

#[tokio::test]
async fn ended_stream_is_fatal() {
    let (_trigger, shutdown) = shutdown_channel();
    let err = vehicle_consumer(Arc::new(EndingBus))
        .run(shutdown)
        .await
        .unwrap_err();
    assert!(matches!(err, TelemetryError::StreamEnded(_)));
}
