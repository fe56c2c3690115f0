use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_config::RelayConfig;
use relay_connector::connection::{ConnectionTarget, ConnectorConnection};
use relay_connector::target::{HttpTargetHandler, TargetHandler};
use relay_connector::telemetry;
use relay_proto::{TenantConfig, TenantId};
use tracing::info;

/// The relay's connector agent.
///
/// Dials a relay-server's hub, forwards each dispatched request to a local
/// HTTP target, and publishes the response/acknowledge back over the
/// broker. Shares `relay-server`'s configuration cascade (compiled defaults
/// -> /etc/relay/config.toml -> ~/.config/relay/config.toml -> ./relay.toml
/// -> RELAY_* env vars); only `[connector]` and the shared `[dispatch]`
/// threshold apply here.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (overrides ./relay.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show loaded configuration and exit
    #[arg(long)]
    show_config: bool,

    /// Base URL of the local target this connector forwards to.
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    target_url: String,

    /// Timeout for one target invocation, in seconds.
    #[arg(long, default_value_t = 30)]
    target_timeout_secs: u64,

    /// Base directory for staging outsourced request/response bodies.
    /// Defaults to `<bodystore_dir>/connector`.
    #[arg(long)]
    bodystore_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, sources) =
        RelayConfig::load_with_sources_from(cli.config.as_deref()).context("failed to load configuration")?;

    if cli.show_config {
        println!("# Configuration sources:");
        for path in &sources.files {
            println!("#   - {}", path.display());
        }
        if !sources.env_overrides.is_empty() {
            println!("# Environment overrides:");
            for var in &sources.env_overrides {
                println!("#   - {}", var);
            }
        }
        println!();
        println!("{}", config.to_toml());
        return Ok(());
    }

    telemetry::init(&config.infra.telemetry.otlp_endpoint).context("failed to initialize OpenTelemetry")?;

    info!("configuration loaded from:");
    for path in &sources.files {
        info!("   - {}", path.display());
    }
    if !sources.env_overrides.is_empty() {
        info!("environment overrides: {:?}", sources.env_overrides);
    }

    let bodystore_dir = cli
        .bodystore_dir
        .unwrap_or_else(|| config.infra.paths.bodystore_dir.join("connector"));
    std::fs::create_dir_all(&bodystore_dir).context("failed to create bodystore directory")?;
    let body_store: Arc<dyn relay_bodystore::BodyStore> = Arc::new(
        relay_bodystore::FsBodyStore::at_path(bodystore_dir.as_path())
            .await
            .context("failed to initialize BodyStore")?,
    );
    info!(dir = %bodystore_dir.display(), "BodyStore ready");

    let handler: Arc<dyn TargetHandler> = Arc::new(
        HttpTargetHandler::new(&cli.target_url, Duration::from_secs(cli.target_timeout_secs))
            .map_err(|e| anyhow::anyhow!("failed to build target handler: {e}"))?,
    );
    info!(target = %cli.target_url, "target handler ready");

    let target = ConnectionTarget {
        hub_dealer_endpoint: config.infra.connector.hub_dealer.clone(),
        broker_pub_endpoint: config.infra.connector.broker_pub.clone(),
        tenant_id: TenantId::new(config.infra.connector.tenant.clone()),
        binary_size_threshold: config.infra.dispatch.default_binary_size_threshold,
    };
    let tenant_config = Arc::new(Mutex::new(TenantConfig::default()));

    let connection = ConnectorConnection::new();
    let mut events = connection.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(?event, "connection lifecycle event");
        }
    });

    connection.clone().start(target, tenant_config, handler, body_store);

    info!(
        hub = %config.infra.connector.hub_dealer,
        broker = %config.infra.connector.broker_pub,
        tenant = %config.infra.connector.tenant,
        "relay-connector starting"
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down gracefully");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("received SIGTERM, shutting down gracefully");
        }
    }

    connection.stop();
    info!("shutdown complete");
    telemetry::shutdown()?;

    Ok(())
}
