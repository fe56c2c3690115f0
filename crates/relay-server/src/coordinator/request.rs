//! RequestCoordinator / TenantDispatcher (C5): picks a connector for a
//! tenant and forwards the request through the hub (C3).
//!
//! Round-robin cursor per tenant, same shape as `zmq::client_tracker`'s
//! per-client bookkeeping but keyed by tenant instead of connector identity.
//! The cursor itself is a `DashMap<TenantId, AtomicUsize>` entry so bumping
//! it never takes a lock shared with any other tenant.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use relay_proto::{HubMessage, RelayRequest, TenantId, TransportError};
use tracing::{debug, warn};

use crate::transport::hub::HubTransport;

/// Resolves a tenant to one of its currently subscribed connectors and pushes
/// the request over the hub. No persistence: an in-flight request that fails
/// to transmit is retried once against a freshly resolved connector set, then
/// surfaced to the caller.
#[derive(Clone)]
pub struct RequestCoordinator {
    hub: HubTransport,
    cursors: Arc<DashMap<TenantId, AtomicUsize>>,
    default_binary_size_threshold: u64,
}

impl RequestCoordinator {
    pub fn new(hub: HubTransport, default_binary_size_threshold: u64) -> Self {
        Self {
            hub,
            cursors: Arc::new(DashMap::new()),
            default_binary_size_threshold,
        }
    }

    /// The inline-body ceiling to apply for a tenant: the smallest threshold
    /// any of its currently subscribed connectors advertised, or the
    /// configured fallback if none are subscribed yet.
    pub fn binary_size_threshold(&self, tenant_id: &TenantId) -> u64 {
        self.hub
            .binary_size_threshold_for_tenant(tenant_id)
            .unwrap_or(self.default_binary_size_threshold)
    }

    fn next_index(&self, tenant_id: &TenantId, len: usize) -> usize {
        let cursor = self
            .cursors
            .entry(tenant_id.clone())
            .or_insert_with(|| AtomicUsize::new(0));
        cursor.fetch_add(1, Ordering::Relaxed) % len
    }

    /// Deliver `request` to one connector subscribed for its tenant.
    ///
    /// Fails immediately with `NoConnector` if none are subscribed. If the
    /// chosen connector has dropped between selection and transmit, re-selects
    /// once against a fresh connector set before surfacing the transport
    /// error to the caller.
    pub async fn deliver_request(&self, request: RelayRequest) -> Result<(), TransportError> {
        let tenant_id = request.tenant_id.clone();

        match self.try_deliver(&tenant_id, &request).await {
            Ok(()) => Ok(()),
            Err(first_err) => {
                debug!(tenant = %tenant_id, error = %first_err, "first delivery attempt failed, re-selecting");
                self.try_deliver(&tenant_id, &request).await.map_err(|second_err| {
                    warn!(tenant = %tenant_id, error = %second_err, "delivery failed after re-selection");
                    second_err
                })
            }
        }
    }

    async fn try_deliver(&self, tenant_id: &TenantId, request: &RelayRequest) -> Result<(), TransportError> {
        let connectors = self.hub.connectors_for_tenant(tenant_id);
        if connectors.is_empty() {
            return Err(TransportError::NoConnector);
        }
        let idx = self.next_index(tenant_id, connectors.len());
        let connector_id = connectors[idx].clone();
        self.hub
            .transmit(connector_id, HubMessage::RequestTarget(request.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_proto::OriginId;
    use std::time::Duration;

    async fn hub_with(entries: &[(&str, &str)]) -> HubTransport {
        let shutdown = tokio_util::sync::CancellationToken::new();
        let hub = HubTransport::bind(
            "tcp://127.0.0.1:0".to_string(),
            Duration::from_secs(30),
            3,
            shutdown,
        )
        .await
        .expect("bind ephemeral hub for test");
        let _ = entries;
        hub
    }

    #[tokio::test]
    async fn no_connectors_is_transport_error() {
        let hub = hub_with(&[]).await;
        let coordinator = RequestCoordinator::new(hub, 1024);
        let request = RelayRequest::builder(TenantId::new("t1"), OriginId::new()).build();
        let err = coordinator.deliver_request(request).await.unwrap_err();
        assert!(matches!(err, TransportError::NoConnector));
    }

    #[test]
    fn cursor_round_robins_distinct_tenants_independently() {
        let cursors = Arc::new(DashMap::new());
        let coordinator = RequestCoordinator {
            hub: futures::executor::block_on(hub_with(&[])),
            cursors,
            default_binary_size_threshold: 1024,
        };
        let t1 = TenantId::new("t1");
        let t2 = TenantId::new("t2");
        assert_eq!(coordinator.next_index(&t1, 3), 0);
        assert_eq!(coordinator.next_index(&t1, 3), 1);
        assert_eq!(coordinator.next_index(&t2, 3), 0);
        assert_eq!(coordinator.next_index(&t1, 3), 2);
    }

    #[test]
    fn binary_size_threshold_falls_back_to_default_with_no_connectors() {
        let hub = futures::executor::block_on(hub_with(&[]));
        let coordinator = RequestCoordinator::new(hub, 2048);
        assert_eq!(coordinator.binary_size_threshold(&TenantId::new("t1")), 2048);
    }
}
