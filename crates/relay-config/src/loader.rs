//! Config file discovery, loading, and environment variable overlay.
//!
//! Cascade (later wins): compiled defaults, `/etc/relay/config.toml`,
//! `~/.config/relay/config.toml`, `./relay.toml` (or `--config`), then
//! `RELAY_*` environment variables.

use crate::{BootstrapConfig, ConfigError, InfraConfig, RelayConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from, surfaced by
/// `--show-config` on both binaries.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub files: Vec<PathBuf>,
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// Returns paths in load order (system, user, local/cli); only files that
/// exist are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/relay/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("relay/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("relay.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file, overlaying onto a base.
pub fn load_from_file(path: &Path, base: RelayConfig) -> Result<RelayConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_toml(&contents, path, base)
}

fn parse_toml(contents: &str, path: &Path, mut config: RelayConfig) -> Result<RelayConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // Top-level [paths]/[bind]/[telemetry]/[dispatch]/[connector] sections,
    // flattened directly into `InfraConfig`. Unknown keys (like [bootstrap])
    // are ignored by serde's default derive behaviour.
    if let Ok(infra) = toml::Value::Table(table.clone()).try_into::<InfraConfig>() {
        config.infra = infra;
    }

    if let Some(bootstrap_table) = table.get("bootstrap") {
        if let Ok(bootstrap) = bootstrap_table.clone().try_into::<BootstrapConfig>() {
            config.bootstrap = bootstrap;
        }
    }

    Ok(config)
}

/// Apply `RELAY_*` environment variable overrides.
pub fn apply_env_overrides(config: &mut RelayConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("RELAY_HTTP_PORT") {
        if let Ok(port) = v.parse() {
            config.infra.bind.http_port = port;
            sources.env_overrides.push("RELAY_HTTP_PORT".to_string());
        }
    }
    if let Ok(v) = env::var("RELAY_HUB_ROUTER") {
        config.infra.bind.hub_router = v;
        sources.env_overrides.push("RELAY_HUB_ROUTER".to_string());
    }
    if let Ok(v) = env::var("RELAY_BROKER_SUB") {
        config.infra.bind.broker_sub = v;
        sources.env_overrides.push("RELAY_BROKER_SUB".to_string());
    }
    if let Ok(v) = env::var("RELAY_BODYSTORE_DIR") {
        config.infra.paths.bodystore_dir = expand_path(&v);
        sources.env_overrides.push("RELAY_BODYSTORE_DIR".to_string());
    }
    if let Ok(v) = env::var("RELAY_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v;
        sources.env_overrides.push("RELAY_OTLP_ENDPOINT".to_string());
    }
    if let Ok(v) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = v;
        sources.env_overrides.push("OTEL_EXPORTER_OTLP_ENDPOINT".to_string());
    }
    if let Ok(v) = env::var("RELAY_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RELAY_LOG_LEVEL".to_string());
    }
    if let Ok(v) = env::var("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
    if let Ok(v) = env::var("RELAY_CONNECTOR_HUB") {
        config.infra.connector.hub_dealer = v;
        sources.env_overrides.push("RELAY_CONNECTOR_HUB".to_string());
    }
    if let Ok(v) = env::var("RELAY_CONNECTOR_BROKER") {
        config.infra.connector.broker_pub = v;
        sources.env_overrides.push("RELAY_CONNECTOR_BROKER".to_string());
    }
    if let Ok(v) = env::var("RELAY_CONNECTOR_TENANT") {
        config.infra.connector.tenant = v;
        sources.env_overrides.push("RELAY_CONNECTOR_TENANT".to_string());
    }
    if let Ok(v) = env::var("RELAY_SPOOL_BOUND") {
        if let Ok(bytes) = v.parse() {
            config.infra.dispatch.spool_bound = bytes;
            sources.env_overrides.push("RELAY_SPOOL_BOUND".to_string());
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_tilde() {
        let expanded = expand_path("~/relay/bodystore");
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn parse_minimal_toml_overlays_onto_defaults() {
        let toml = r#"
[bind]
http_port = 9090
"#;
        let config = parse_toml(toml, Path::new("test.toml"), RelayConfig::default()).unwrap();
        assert_eq!(config.infra.bind.http_port, 9090);
    }

    #[test]
    fn parse_tenant_bootstrap() {
        let toml = r#"
[bootstrap.tenants.acme]
keep_alive_interval_ms = 5000
enable_tracing = true
"#;
        let config = parse_toml(toml, Path::new("test.toml"), RelayConfig::default()).unwrap();
        let acme = config.bootstrap.tenants.get("acme").unwrap();
        assert_eq!(acme.keep_alive_interval_ms, 5000);
        assert_eq!(acme.enable_tracing, Some(true));
    }
}
