//! `GET /healthz`: a point-in-time snapshot of server state — one
//! `axum::Json` blob built from whatever each subsystem already tracks, no
//! separate metrics system.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::Json;
use relay_proto::TenantId;

use crate::coordinator::{AcknowledgeCoordinator, ResponseCoordinator};
use crate::tenant::TenantRegistry;
use crate::transport::HubTransport;

#[derive(Clone)]
pub struct HealthState {
    pub tenants: TenantRegistry,
    pub hub: HubTransport,
    pub response_coordinator: ResponseCoordinator,
    pub acknowledge_coordinator: AcknowledgeCoordinator,
    pub start_time: Arc<Instant>,
}

pub async fn handler(State(state): State<HealthState>) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed();

    let tenants: Vec<_> = state
        .tenants
        .names()
        .map(|name| {
            let tenant_id = TenantId::new(name);
            serde_json::json!({
                "name": name,
                "connectors": state.hub.connectors_for_tenant(&tenant_id).len(),
                "binary_size_threshold": state.hub.binary_size_threshold_for_tenant(&tenant_id),
            })
        })
        .collect();

    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime.as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "tenants": tenants,
        "hub": state.hub.summary(),
        "coordinators": {
            "pending_responses": state.response_coordinator.pending_count(),
            "pending_acknowledges": state.acknowledge_coordinator.pending_count(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_bodystore::BodyStore;
    use relay_config::{BootstrapConfig, TenantBootstrap};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn reports_registered_tenants_and_empty_coordinators() {
        let tmp = tempfile::tempdir().unwrap();
        let body_store: Arc<dyn BodyStore> =
            Arc::new(relay_bodystore::FsBodyStore::at_path(tmp.path()).await.unwrap());

        let hub = HubTransport::bind(
            "tcp://127.0.0.1:0".to_string(),
            Duration::from_secs(30),
            3,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let mut tenants = HashMap::new();
        tenants.insert("acme".to_string(), TenantBootstrap::default());
        let registry = TenantRegistry::from_bootstrap(&BootstrapConfig { tenants });

        let state = HealthState {
            tenants: registry,
            hub,
            response_coordinator: ResponseCoordinator::new(body_store),
            acknowledge_coordinator: AcknowledgeCoordinator::new(),
            start_time: Arc::new(Instant::now()),
        };

        let Json(body) = handler(State(state)).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tenants"][0]["name"], "acme");
        assert_eq!(body["coordinators"]["pending_responses"], 0);
    }
}
