//! Infrastructure configuration - fixed at process start, never mutated by
//! the running process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths used by the relay server/connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for the BodyStore's staged request/response bodies.
    /// Default: ~/.relay/bodystore
    #[serde(default = "PathsConfig::default_bodystore_dir")]
    pub bodystore_dir: PathBuf,
}

impl PathsConfig {
    fn default_bodystore_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".relay").join("bodystore"))
            .unwrap_or_else(|| PathBuf::from(".relay/bodystore"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            bodystore_dir: Self::default_bodystore_dir(),
        }
    }
}

/// Network bind addresses for `relay-server`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    /// HTTP port for the public ingress surface and `/healthz`.
    /// Default: 8088
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,

    /// ZMQ ROUTER address connectors dial into for the hub channel
    /// (`RequestTarget`/`Configure` invocations).
    /// Default: tcp://0.0.0.0:5690
    #[serde(default = "BindConfig::default_hub_router")]
    pub hub_router: String,

    /// ZMQ SUB bind address for the response/acknowledge broker. Connectors
    /// connect a PUB socket here and publish `response.{origin}` /
    /// `acknowledge.{origin}` frames; see `relay_server::transport::broker`.
    /// Default: tcp://0.0.0.0:5691
    #[serde(default = "BindConfig::default_broker_sub")]
    pub broker_sub: String,
}

impl BindConfig {
    fn default_http_port() -> u16 {
        8088
    }

    fn default_hub_router() -> String {
        "tcp://0.0.0.0:5690".to_string()
    }

    fn default_broker_sub() -> String {
        "tcp://0.0.0.0:5691".to_string()
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            http_port: Self::default_http_port(),
            hub_router: Self::default_hub_router(),
            broker_sub: Self::default_broker_sub(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry.
    /// Default: 127.0.0.1:4317
    #[serde(default = "TelemetryConfig::default_otlp_endpoint")]
    pub otlp_endpoint: String,

    /// Log level (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_otlp_endpoint() -> String {
        "127.0.0.1:4317".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: Self::default_otlp_endpoint(),
            log_level: Self::default_log_level(),
        }
    }
}

/// Ingress dispatch tuning: spool/spill thresholds for rewindable request bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Bound, in bytes, below which a drained request body is spooled
    /// in-memory; beyond it, the rewindable buffer spills to a BodyStore
    /// staging file. Default: 8 MiB.
    #[serde(default = "DispatchConfig::default_spool_bound")]
    pub spool_bound: u64,

    /// Fallback inline-size threshold used when no connector is currently
    /// subscribed to advertise a smaller `binary_size_threshold`.
    /// Default: 1 MiB.
    #[serde(default = "DispatchConfig::default_binary_size_threshold")]
    pub default_binary_size_threshold: u64,
}

impl DispatchConfig {
    fn default_spool_bound() -> u64 {
        8 * 1024 * 1024
    }

    fn default_binary_size_threshold() -> u64 {
        1024 * 1024
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            spool_bound: Self::default_spool_bound(),
            default_binary_size_threshold: Self::default_binary_size_threshold(),
        }
    }
}

/// `relay-connector`-side settings: which server to dial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// ZMQ DEALER endpoint to connect to the server's hub ROUTER.
    /// Default: tcp://localhost:5690
    #[serde(default = "ConnectorConfig::default_hub_dealer")]
    pub hub_dealer: String,

    /// ZMQ PUB endpoint to connect to the server's broker SUB.
    /// Default: tcp://localhost:5691
    #[serde(default = "ConnectorConfig::default_broker_pub")]
    pub broker_pub: String,

    /// Tenant this connector subscribes to.
    #[serde(default = "ConnectorConfig::default_tenant")]
    pub tenant: String,
}

impl ConnectorConfig {
    fn default_hub_dealer() -> String {
        "tcp://localhost:5690".to_string()
    }

    fn default_broker_pub() -> String {
        "tcp://localhost:5691".to_string()
    }

    fn default_tenant() -> String {
        "default".to_string()
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            hub_dealer: Self::default_hub_dealer(),
            broker_pub: Self::default_broker_pub(),
            tenant: Self::default_tenant(),
        }
    }
}

/// Infrastructure configuration - cannot change at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfraConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub bind: BindConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub connector: ConnectorConfig,
}
