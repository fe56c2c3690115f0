//! Bootstrap configuration: seeds the `TenantRegistry`'s initial state.
//!
//! The registry itself only supports lookup-by-name at runtime; these
//! entries are how tenants come to exist at all for a freshly started
//! server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tenant's bootstrap policy, mirroring `relay_proto::TenantConfig`'s
/// fields without taking a dependency edge the other way (relay-proto stays
/// the lower layer; relay-config only produces the values it carries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantBootstrap {
    #[serde(default = "TenantBootstrap::default_keep_alive_ms")]
    pub keep_alive_interval_ms: u64,
    #[serde(default = "TenantBootstrap::default_reconnect_min_ms")]
    pub reconnect_minimum_delay_ms: u64,
    #[serde(default = "TenantBootstrap::default_reconnect_max_ms")]
    pub reconnect_maximum_delay_ms: u64,
    #[serde(default)]
    pub enable_tracing: Option<bool>,
    /// Request expiration applied when the ingress request itself didn't
    /// specify one. `None` means no deadline.
    #[serde(default)]
    pub request_expiration_ms: Option<u64>,
}

impl TenantBootstrap {
    fn default_keep_alive_ms() -> u64 {
        30_000
    }

    fn default_reconnect_min_ms() -> u64 {
        1_000
    }

    fn default_reconnect_max_ms() -> u64 {
        32_000
    }
}

impl Default for TenantBootstrap {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: Self::default_keep_alive_ms(),
            reconnect_minimum_delay_ms: Self::default_reconnect_min_ms(),
            reconnect_maximum_delay_ms: Self::default_reconnect_max_ms(),
            enable_tracing: None,
            request_expiration_ms: None,
        }
    }
}

/// Seeds of runtime state; after startup the registry is the source of
/// truth, but these values populate it before any tenant has connected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub tenants: HashMap<String, TenantBootstrap>,
}
