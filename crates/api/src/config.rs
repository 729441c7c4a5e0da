//! Process configuration loaded from environment variables.

use std::time::Duration;

use common::DEFAULT_TELEMETRY_TOPIC;
use saga::DEFAULT_JOURNAL_CAPACITY;

pub const DEFAULT_VEHICLE_PORT: u16 = 8081;
pub const DEFAULT_TRIP_PORT: u16 = 8082;
pub const DEFAULT_GATEWAY_PORT: u16 = 8080;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Listener and logging settings shared by every process.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default depends on the process)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl ServerConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>, default_port: u16) -> Self {
        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(lookup("PORT"), default_port),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
        }
    }

    fn with_port(port: u16) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// PostgreSQL settings. Absent when `DATABASE_URL` is unset, in which case
/// the service runs on its in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Option<Self> {
        let url = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty())?;
        Some(Self {
            url,
            max_connections: parse_or(lookup("DATABASE_MAX_CONNECTIONS"), 10),
        })
    }
}

/// Telemetry bus settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Kafka bootstrap servers; the in-memory bus is used when unset.
    pub brokers: Option<String>,
    pub topic: String,
}

impl BusConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            brokers: lookup("KAFKA_BROKERS").filter(|b| !b.trim().is_empty()),
            topic: lookup("TELEMETRY_TOPIC").unwrap_or_else(|| DEFAULT_TELEMETRY_TOPIC.to_string()),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: None,
            topic: DEFAULT_TELEMETRY_TOPIC.to_string(),
        }
    }
}

/// Vehicle service configuration.
#[derive(Debug, Clone)]
pub struct VehicleServiceConfig {
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub bus: BusConfig,
    /// Number of vehicles provisioned at startup.
    pub seed_vehicles: u32,
}

impl VehicleServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server: ServerConfig::from_lookup(&lookup, DEFAULT_VEHICLE_PORT),
            database: DatabaseConfig::from_lookup(&lookup),
            bus: BusConfig::from_lookup(&lookup),
            seed_vehicles: parse_or(lookup("SEED_VEHICLES"), 0),
        }
    }
}

impl Default for VehicleServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::with_port(DEFAULT_VEHICLE_PORT),
            database: None,
            bus: BusConfig::default(),
            seed_vehicles: 0,
        }
    }
}

/// Trip service configuration.
#[derive(Debug, Clone)]
pub struct TripServiceConfig {
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub bus: BusConfig,
    /// Trip writes also flip vehicle status (both services on one database).
    pub shared_vehicle_store: bool,
}

impl TripServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server: ServerConfig::from_lookup(&lookup, DEFAULT_TRIP_PORT),
            database: DatabaseConfig::from_lookup(&lookup),
            bus: BusConfig::from_lookup(&lookup),
            shared_vehicle_store: lookup("SHARED_VEHICLE_STORE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }
}

impl Default for TripServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::with_port(DEFAULT_TRIP_PORT),
            database: None,
            bus: BusConfig::default(),
            shared_vehicle_store: false,
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub bus: BusConfig,
    pub vehicle_service_url: String,
    pub trip_service_url: String,
    /// Timeout for each call to a peer service.
    pub peer_timeout: Duration,
    /// Number of sagas kept for `GET /sagas/{id}`.
    pub saga_journal_capacity: usize,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            server: ServerConfig::from_lookup(&lookup, DEFAULT_GATEWAY_PORT),
            bus: BusConfig::from_lookup(&lookup),
            vehicle_service_url: lookup("VEHICLE_SERVICE_URL")
                .unwrap_or(defaults.vehicle_service_url),
            trip_service_url: lookup("TRIP_SERVICE_URL").unwrap_or(defaults.trip_service_url),
            peer_timeout: Duration::from_secs(parse_or(lookup("PEER_TIMEOUT_SECS"), 10)),
            saga_journal_capacity: parse_or(
                lookup("SAGA_JOURNAL_CAPACITY"),
                defaults.saga_journal_capacity,
            ),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::with_port(DEFAULT_GATEWAY_PORT),
            bus: BusConfig::default(),
            vehicle_service_url: format!("http://127.0.0.1:{DEFAULT_VEHICLE_PORT}"),
            trip_service_url: format!("http://127.0.0.1:{DEFAULT_TRIP_PORT}"),
            peer_timeout: Duration::from_secs(10),
            saga_journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
