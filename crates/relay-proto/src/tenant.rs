//! `TenantConfig`: per-tenant policy pushed to connectors via `Configure`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Duration fields travel as millisecond integers on the wire, so the struct
/// stays trivially `Serialize`/`Deserialize` without a `serde_with`
/// dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    #[serde(default = "TenantConfig::default_keep_alive_ms")]
    pub keep_alive_interval_ms: u64,
    #[serde(default = "TenantConfig::default_reconnect_min_ms")]
    pub reconnect_minimum_delay_ms: u64,
    #[serde(default = "TenantConfig::default_reconnect_max_ms")]
    pub reconnect_maximum_delay_ms: u64,
    #[serde(default)]
    pub enable_tracing: Option<bool>,
}

impl TenantConfig {
    fn default_keep_alive_ms() -> u64 {
        30_000
    }

    fn default_reconnect_min_ms() -> u64 {
        1_000
    }

    fn default_reconnect_max_ms() -> u64 {
        32_000
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn reconnect_minimum_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_minimum_delay_ms)
    }

    pub fn reconnect_maximum_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_maximum_delay_ms)
    }

    /// Logical OR with the request's own tracing flag. Never forces tracing
    /// off.
    pub fn resolve_tracing(&self, request_wants_tracing: bool) -> bool {
        request_wants_tracing || self.enable_tracing.unwrap_or(false)
    }
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: Self::default_keep_alive_ms(),
            reconnect_minimum_delay_ms: Self::default_reconnect_min_ms(),
            reconnect_maximum_delay_ms: Self::default_reconnect_max_ms(),
            enable_tracing: None,
        }
    }
}
