//! Trip service entry point.

use api::config::TripServiceConfig;
use api::server;

#[tokio::main]
async fn main() {
    let config = TripServiceConfig::from_env();
    server::init_tracing(&config.server);

    let metrics_handle = server::install_metrics().expect("failed to install Prometheus recorder");

    server::run_trip_service(config, metrics_handle)
        .await
        .expect("trip service failed");

    tracing::info!("trip service shut down gracefully");
}
