//! Vehicle service entry point.

use api::config::VehicleServiceConfig;
use api::server;

#[tokio::main]
async fn main() {
    let config = VehicleServiceConfig::from_env();
    server::init_tracing(&config.server);

    let metrics_handle = server::install_metrics().expect("failed to install Prometheus recorder");

    server::run_vehicle_service(config, metrics_handle)
        .await
        .expect("vehicle service failed");

    tracing::info!("vehicle service shut down gracefully");
}
