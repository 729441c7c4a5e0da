//! Gateway entry point.

use api::config::GatewayConfig;
use api::server;

#[tokio::main]
async fn main() {
    let config = GatewayConfig::from_env();
    server::init_tracing(&config.server);

    let metrics_handle = server::install_metrics().expect("failed to install Prometheus recorder");

    server::run_gateway(config, metrics_handle)
        .await
        .expect("gateway failed");

    tracing::info!("gateway shut down gracefully");
}
