//! Configuration loading for `relay-server` and `relay-connector`.
//!
//! Split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): fixed at process start - bind
//!   addresses, paths, telemetry, dispatch tuning.
//! - **Bootstrap** (`BootstrapConfig`): seeds the `TenantRegistry`'s initial
//!   state. After startup the registry is the source of truth.
//!
//! # Config file locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/relay/config.toml` (system)
//! 2. `~/.config/relay/config.toml` (user)
//! 3. `./relay.toml` (local override, or `--config`)
//! 4. Environment variables (`RELAY_*`)

pub mod bootstrap;
pub mod infra;
pub mod loader;

pub use bootstrap::{BootstrapConfig, TenantBootstrap};
pub use infra::{BindConfig, ConnectorConfig, DispatchConfig, InfraConfig, PathsConfig, TelemetryConfig};
pub use loader::ConfigSources;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl RelayConfig {
    /// Load configuration from all sources (see module docs for cascade).
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load from a specific file path (CLI `--config`), then apply env overrides.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = RelayConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            config = loader::load_from_file(&path, config)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Render the effective configuration as TOML, for `--show-config`.
    pub fn to_toml(&self) -> String {
        let mut out = String::new();
        out.push_str("# Relay configuration\n\n");
        out.push_str("[paths]\n");
        out.push_str(&format!(
            "bodystore_dir = \"{}\"\n\n",
            self.infra.paths.bodystore_dir.display()
        ));
        out.push_str("[bind]\n");
        out.push_str(&format!("http_port = {}\n", self.infra.bind.http_port));
        out.push_str(&format!("hub_router = \"{}\"\n", self.infra.bind.hub_router));
        out.push_str(&format!("broker_sub = \"{}\"\n\n", self.infra.bind.broker_sub));
        out.push_str("[telemetry]\n");
        out.push_str(&format!(
            "otlp_endpoint = \"{}\"\n",
            self.infra.telemetry.otlp_endpoint
        ));
        out.push_str(&format!("log_level = \"{}\"\n\n", self.infra.telemetry.log_level));
        out.push_str("[dispatch]\n");
        out.push_str(&format!("spool_bound = {}\n", self.infra.dispatch.spool_bound));
        out.push_str(&format!(
            "default_binary_size_threshold = {}\n\n",
            self.infra.dispatch.default_binary_size_threshold
        ));
        out.push_str("[connector]\n");
        out.push_str(&format!("hub_dealer = \"{}\"\n", self.infra.connector.hub_dealer));
        out.push_str(&format!("broker_pub = \"{}\"\n", self.infra.connector.broker_pub));
        out.push_str(&format!("tenant = \"{}\"\n", self.infra.connector.tenant));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let config = RelayConfig::load().unwrap();
        assert_eq!(config.infra.bind.http_port, 8088);
    }

    #[test]
    fn to_toml_contains_sections() {
        let config = RelayConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[bind]"));
        assert!(toml.contains("[connector]"));
    }
}
