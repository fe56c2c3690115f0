use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use clap::Parser;
use relay_bodystore::{BodyStore, FsBodyStore};
use relay_config::RelayConfig;
use relay_proto::OriginId;
use relay_server::coordinator::{AcknowledgeCoordinator, RequestCoordinator, ResponseCoordinator};
use relay_server::healthz::{self, HealthState};
use relay_server::ingress::RelayMiddleware;
use relay_server::tenant::TenantRegistry;
use relay_server::transport::{BrokerConsumer, HubTransport};
use relay_server::telemetry;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The relay's public edge server.
///
/// Terminates HTTP for every tenant's relay path, buffers and dispatches
/// requests to connectors over the hub, and correlates their responses back
/// to the waiting caller.
///
/// Configuration is loaded from (in order, later wins):
/// 1. Compiled defaults
/// 2. /etc/relay/config.toml
/// 3. ~/.config/relay/config.toml
/// 4. ./relay.toml (or --config path)
/// 5. Environment variables (RELAY_*)
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (overrides ./relay.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show loaded configuration and exit
    #[arg(long)]
    show_config: bool,
}

/// Combines the `/healthz` state with the ingress fallback's state so both
/// live on the one router instead of two merged sub-routers with disjoint
/// state types.
#[derive(Clone)]
struct AppState {
    health: HealthState,
    middleware: Arc<RelayMiddleware>,
}

impl FromRef<AppState> for HealthState {
    fn from_ref(state: &AppState) -> Self {
        state.health.clone()
    }
}

impl FromRef<AppState> for Arc<RelayMiddleware> {
    fn from_ref(state: &AppState) -> Self {
        state.middleware.clone()
    }
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

    let bodystore_dir = &config.infra.paths.bodystore_dir;
    std::fs::create_dir_all(bodystore_dir).context("failed to create bodystore directory")?;
    let body_store: Arc<dyn BodyStore> = Arc::new(
        FsBodyStore::at_path(bodystore_dir.as_path())
            .await
            .context("failed to initialize BodyStore")?,
    );
    info!(dir = %bodystore_dir.display(), "BodyStore ready");

    let origin_id = OriginId::new();
    let tenants = TenantRegistry::from_bootstrap(&config.bootstrap);
    info!(count = tenants.len(), "tenant registry seeded from bootstrap config");

    let shutdown = CancellationToken::new();

    let hub = HubTransport::bind(
        config.infra.bind.hub_router.clone(),
        std::time::Duration::from_secs(60),
        5,
        shutdown.clone(),
    )
    .await
    .context("failed to bind hub ROUTER")?;

    let response_coordinator = ResponseCoordinator::new(body_store.clone());
    let acknowledge_coordinator = AcknowledgeCoordinator::new();
    let request_coordinator = RequestCoordinator::new(
        hub.clone(),
        config.infra.dispatch.default_binary_size_threshold,
    );

    let broker = BrokerConsumer::new(
        config.infra.bind.broker_sub.clone(),
        origin_id,
        response_coordinator.clone(),
        acknowledge_coordinator.clone(),
    );
    let broker_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = broker.run(broker_shutdown).await {
            tracing::error!("broker consumer exited with error: {:?}", e);
        }
    });

    let scratch_dir = bodystore_dir.join("scratch");
    let middleware = Arc::new(RelayMiddleware::new(
        origin_id,
        tenants.clone(),
        response_coordinator.clone(),
        acknowledge_coordinator.clone(),
        request_coordinator,
        body_store,
        config.infra.dispatch.spool_bound,
        scratch_dir,
    ));

    let health_state = HealthState {
        tenants,
        hub,
        response_coordinator,
        acknowledge_coordinator,
        start_time: Arc::new(Instant::now()),
    };

    let app_state = AppState {
        health: health_state,
        middleware,
    };

    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(healthz::handler))
        .fallback(relay_server::ingress::route)
        .with_state(app_state);

    let bind_addr: std::net::SocketAddr = format!("0.0.0.0:{}", config.infra.bind.http_port)
        .parse()
        .context("failed to parse HTTP bind address")?;
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {bind_addr}"))?;

    info!(addr = %bind_addr, "relay-server starting");
    info!("   Health: GET http://{}/healthz", bind_addr);
    info!("   Hub ROUTER: {}", config.infra.bind.hub_router);
    info!("   Broker SUB: {}", config.infra.bind.broker_sub);

    let server_shutdown = shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        server_shutdown.cancelled().await;
        info!("HTTP server shutdown signal received");
    });
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            tracing::error!("HTTP server exited with error: {:?}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down gracefully");
            shutdown.cancel();
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
            shutdown.cancel();
        }
    }

    let _ = server_handle.await;
    info!("shutdown complete");
    telemetry::shutdown()?;

    Ok(())
}
