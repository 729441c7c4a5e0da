//! Process bootstrap shared by the three binaries.
//!
//! Startup order: tracing, metrics recorder, bus, store, then the listener
//! and the telemetry consumer. Shutdown runs in reverse: a signal (or a
//! fatal consumer error) fires the shared [`Shutdown`], the listener drains
//! for up to [`SHUTDOWN_GRACE`], the consumer stops, and only then is the
//! database pool closed.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use common::{Coordinates, TimeOrderedIds, Vehicle};
use domain::{DomainError, TripService, VehicleService};
use messaging::{BusError, InMemoryBus, Publisher, Subscriber, consumer_group};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use saga::{
    ClientError, HttpTripClient, HttpVehicleClient, InMemorySagaJournal, ReconciliationQueue,
    TripSagaCoordinator,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use store::{
    InMemoryTripStore, InMemoryVehicleStore, PostgresTripStore, PostgresVehicleStore, TripStore,
    VehicleStore, run_migrations,
};
use telemetry::{
    PublisherDeadLetters, Shutdown, ShutdownTrigger, TelemetryConsumer, TelemetryError,
    TelemetryHandler, TripLocationHandler, VehicleLocationHandler, shutdown_channel,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{
    BusConfig, DatabaseConfig, GatewayConfig, LogFormat, ServerConfig, TripServiceConfig,
    VehicleServiceConfig,
};
use crate::routes::gateway::GatewayState;
use crate::routes::trips::TripState;
use crate::routes::vehicles::VehicleState;
use crate::{TRIP_SERVICE, VEHICLE_SERVICE};

/// Time the listener gets to drain in-flight requests after shutdown fires.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Errors that stop a process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Telemetry consumer failed: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Peer client error: {0}")]
    Client(#[from] ClientError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Installs the global Prometheus recorder.
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Shutdown scope shared by the listener and background tasks.
pub struct Lifecycle {
    trigger: Arc<ShutdownTrigger>,
    shutdown: Shutdown,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (trigger, shutdown) = shutdown_channel();
        Self {
            trigger: Arc::new(trigger),
            shutdown,
        }
    }

    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Fires the shutdown signal.
    pub fn trigger(&self) {
        self.trigger.trigger();
    }

    /// Fires the shutdown signal on SIGINT or SIGTERM.
    pub fn listen_for_signals(&self) {
        let trigger = Arc::clone(&self.trigger);
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.trigger();
        });
    }

    /// Runs a telemetry consumer until shutdown. A fatal consumer error
    /// shuts the whole process down.
    pub fn spawn_consumer<H: TelemetryHandler + 'static>(
        &self,
        consumer: TelemetryConsumer<H>,
    ) -> JoinHandle<Result<(), TelemetryError>> {
        let trigger = Arc::clone(&self.trigger);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let result = consumer.run(shutdown).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "telemetry consumer failed, shutting down");
                trigger.trigger();
            }
            result
        })
    }

    /// Serves `app` until shutdown, then waits for `background` tasks.
    ///
    /// Returns the first error among the listener and the tasks.
    pub async fn serve(
        &self,
        listener: TcpListener,
        app: Router,
        background: Vec<JoinHandle<Result<(), TelemetryError>>>,
    ) -> Result<(), ServerError> {
        let drain = self.shutdown.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain.cancelled().await })
                .await
        });

        let served = tokio::select! {
            res = &mut server => {
                self.trigger();
                res
            }
            () = self.shutdown.cancelled() => {
                match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                    Ok(res) => res,
                    Err(_) => {
                        tracing::warn!(
                            grace_secs = SHUTDOWN_GRACE.as_secs(),
                            "grace period elapsed, dropping open connections"
                        );
                        server.abort();
                        Ok(Ok(()))
                    }
                }
            }
        };

        let mut result = match served {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ServerError::Io(e)),
            Err(e) => Err(ServerError::Join(e)),
        };

        for task in background {
            let task_result = match task.await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => ServerError::Telemetry(e),
                Err(e) => ServerError::Join(e),
            };
            if result.is_ok() {
                result = Err(task_result);
            }
        }

        result
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Publisher and subscriber halves of the telemetry bus.
#[derive(Clone)]
pub struct Bus {
    pub publisher: Arc<dyn Publisher>,
    pub subscriber: Arc<dyn Subscriber>,
}

impl Bus {
    pub fn in_memory() -> Self {
        let bus = Arc::new(InMemoryBus::new());
        Self {
            publisher: bus.clone(),
            subscriber: bus,
        }
    }
}

/// Connects to Kafka when brokers are configured, otherwise falls back to
/// an in-process bus.
pub fn build_bus(config: &BusConfig) -> Result<Bus, ServerError> {
    match &config.brokers {
        Some(brokers) => connect_kafka(brokers),
        None => {
            tracing::warn!(
                topic = %config.topic,
                "KAFKA_BROKERS unset, telemetry stays inside this process"
            );
            Ok(Bus::in_memory())
        }
    }
}

#[cfg(feature = "kafka")]
fn connect_kafka(brokers: &str) -> Result<Bus, ServerError> {
    let bus = Arc::new(messaging::KafkaBus::new(brokers)?);
    tracing::info!(%brokers, "connected to kafka");
    Ok(Bus {
        publisher: bus.clone(),
        subscriber: bus,
    })
}

#[cfg(not(feature = "kafka"))]
fn connect_kafka(_brokers: &str) -> Result<Bus, ServerError> {
    Err(ServerError::Config(
        "KAFKA_BROKERS is set but this build lacks the `kafka` feature".to_string(),
    ))
}

/// Opens the pool and applies pending migrations.
pub async fn connect_database(config: &DatabaseConfig) -> Result<PgPool, ServerError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    run_migrations(&pool).await?;
    tracing::info!(max_connections = config.max_connections, "database ready");
    Ok(pool)
}

/// Available vehicles `vehicle-0001` .. `vehicle-{count}` parked at (0, 0).
pub fn seed_fleet(count: u32) -> Vec<Vehicle> {
    (1..=count)
        .map(|n| Vehicle::available(format!("vehicle-{n:04}"), Coordinates::new(0.0, 0.0)))
        .collect()
}

/// Runs the vehicle service until shutdown.
pub async fn run_vehicle_service(
    config: VehicleServiceConfig,
    metrics_handle: PrometheusHandle,
) -> Result<(), ServerError> {
    let bus = build_bus(&config.bus)?;
    match &config.database {
        Some(db) => {
            let pool = connect_database(db).await?;
            let store = PostgresVehicleStore::new(pool.clone());
            let result = vehicle_service(&config, store, bus, metrics_handle).await;
            pool.close().await;
            result
        }
        None => {
            vehicle_service(&config, InMemoryVehicleStore::new(), bus, metrics_handle).await
        }
    }
}

async fn vehicle_service<S: VehicleStore + Clone + 'static>(
    config: &VehicleServiceConfig,
    store: S,
    bus: Bus,
    metrics_handle: PrometheusHandle,
) -> Result<(), ServerError> {
    let vehicles = VehicleService::new(store);
    if config.seed_vehicles > 0 {
        vehicles.provision(seed_fleet(config.seed_vehicles)).await?;
    }

    let lifecycle = Lifecycle::new();
    lifecycle.listen_for_signals();

    let consumer = TelemetryConsumer::new(
        Arc::clone(&bus.subscriber),
        &config.bus.topic,
        consumer_group(VEHICLE_SERVICE),
        VehicleLocationHandler::new(vehicles.clone()),
        Arc::new(PublisherDeadLetters::new(Arc::clone(&bus.publisher))),
    );
    let consumer_task = lifecycle.spawn_consumer(consumer);

    let app = crate::create_vehicle_app(Arc::new(VehicleState { vehicles }), metrics_handle);
    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "vehicle service listening");

    lifecycle.serve(listener, app, vec![consumer_task]).await
}

/// Runs the trip service until shutdown.
pub async fn run_trip_service(
    config: TripServiceConfig,
    metrics_handle: PrometheusHandle,
) -> Result<(), ServerError> {
    let bus = build_bus(&config.bus)?;
    match &config.database {
        Some(db) => {
            let pool = connect_database(db).await?;
            let store = if config.shared_vehicle_store {
                PostgresTripStore::with_shared_vehicles(pool.clone())
            } else {
                PostgresTripStore::new(pool.clone())
            };
            let result = trip_service(&config, store, bus, metrics_handle).await;
            pool.close().await;
            result
        }
        None => {
            if config.shared_vehicle_store {
                tracing::warn!("SHARED_VEHICLE_STORE needs DATABASE_URL; ignoring it");
            }
            trip_service(&config, InMemoryTripStore::new(), bus, metrics_handle).await
        }
    }
}

async fn trip_service<S: TripStore + Clone + 'static>(
    config: &TripServiceConfig,
    store: S,
    bus: Bus,
    metrics_handle: PrometheusHandle,
) -> Result<(), ServerError> {
    let trips = TripService::new(store, TimeOrderedIds);

    let lifecycle = Lifecycle::new();
    lifecycle.listen_for_signals();

    let consumer = TelemetryConsumer::new(
        Arc::clone(&bus.subscriber),
        &config.bus.topic,
        consumer_group(TRIP_SERVICE),
        TripLocationHandler::new(trips.clone()),
        Arc::new(PublisherDeadLetters::new(Arc::clone(&bus.publisher))),
    );
    let consumer_task = lifecycle.spawn_consumer(consumer);

    let app = crate::create_trip_app(Arc::new(TripState { trips }), metrics_handle);
    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "trip service listening");

    lifecycle.serve(listener, app, vec![consumer_task]).await
}

/// Runs the gateway until shutdown.
pub async fn run_gateway(
    config: GatewayConfig,
    metrics_handle: PrometheusHandle,
) -> Result<(), ServerError> {
    let bus = build_bus(&config.bus)?;
    if config.bus.brokers.is_none() {
        tracing::warn!(
            "gateway has no KAFKA_BROKERS: /trip/track events are not delivered to any service"
        );
    }
    let coordinator = TripSagaCoordinator::new(
        HttpVehicleClient::new(&config.vehicle_service_url, config.peer_timeout)?,
        HttpTripClient::new(&config.trip_service_url, config.peer_timeout)?,
        InMemorySagaJournal::with_capacity(config.saga_journal_capacity),
        ReconciliationQueue::new(),
    );
    let state = GatewayState {
        coordinator,
        publisher: bus.publisher,
        telemetry_topic: config.bus.topic.clone(),
    };

    let lifecycle = Lifecycle::new();
    lifecycle.listen_for_signals();

    let app = crate::create_gateway_app(Arc::new(state), metrics_handle);
    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        %addr,
        vehicle_service = %config.vehicle_service_url,
        trip_service = %config.trip_service_url,
        "gateway listening"
    );

    lifecycle.serve(listener, app, Vec::new()).await
}
