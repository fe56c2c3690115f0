//! ConnectorTransport (C3): the server side of the hub.
//!
//! A ZMQ ROUTER socket, owned by one background task: a `tokio::select!`
//! over `socket.recv()` and a shutdown signal, with an outbound command
//! channel layered on top so `transmit()` can push unsolicited
//! `RequestTarget`/`Configure` frames to a specific connector's identity
//! without fighting the recv loop for the socket.
//!
//! Connector liveness is tracked by `last_seen` timestamp and failure count,
//! with stale entries evicted periodically.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use dashmap::DashMap;
use relay_proto::{ConnectorId, HubControl, HubMessage, TenantId, TransportError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use zeromq::{RouterSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

/// What the transport knows about one connected connector.
#[derive(Debug, Clone)]
pub struct ConnectorInfo {
    pub tenant_id: TenantId,
    pub binary_size_threshold: u64,
    pub connected_at: Instant,
    pub last_seen: Instant,
    pub failures: u32,
}

enum HubCommand {
    Transmit {
        connector_id: ConnectorId,
        message: HubMessage,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
}

/// Handle to the running hub transport. Cheap to clone; all clones share the
/// same connector table and command channel.
#[derive(Clone)]
pub struct HubTransport {
    connectors: Arc<DashMap<ConnectorId, ConnectorInfo>>,
    cmd_tx: mpsc::Sender<HubCommand>,
}

impl HubTransport {
    /// Bind the ROUTER socket and spawn the owning task. Returns once bound.
    pub async fn bind(
        bind_address: String,
        stale_threshold: Duration,
        max_failures: u32,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> Result<Self> {
        let mut socket = RouterSocket::new();
        socket
            .bind(&bind_address)
            .await
            .with_context(|| format!("failed to bind hub ROUTER to {bind_address}"))?;
        info!("hub ROUTER listening on {}", bind_address);

        let connectors: Arc<DashMap<ConnectorId, ConnectorInfo>> = Arc::new(DashMap::new());
        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        tokio::spawn(run(
            socket,
            connectors.clone(),
            cmd_rx,
            stale_threshold,
            max_failures,
            shutdown,
        ));

        Ok(Self { connectors, cmd_tx })
    }

    /// Connectors currently subscribed for a tenant, for `RequestCoordinator`
    /// to round-robin over.
    pub fn connectors_for_tenant(&self, tenant_id: &TenantId) -> Vec<ConnectorId> {
        self.connectors
            .iter()
            .filter(|entry| &entry.tenant_id == tenant_id)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Smallest `binary_size_threshold` advertised by any connector currently
    /// subscribed to this tenant, or `None` if there are none.
    pub fn binary_size_threshold_for_tenant(&self, tenant_id: &TenantId) -> Option<u64> {
        self.connectors
            .iter()
            .filter(|entry| &entry.tenant_id == tenant_id)
            .map(|entry| entry.binary_size_threshold)
            .min()
    }

    pub fn is_connected(&self, connector_id: &ConnectorId) -> bool {
        self.connectors.contains_key(connector_id)
    }

    /// Push a `RequestTarget`/`Configure` invocation to one connector.
    pub async fn transmit(
        &self,
        connector_id: ConnectorId,
        message: HubMessage,
    ) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(HubCommand::Transmit {
                connector_id: connector_id.clone(),
                message,
                reply,
            })
            .await
            .map_err(|_| TransportError::ConnectorGone(connector_id.clone()))?;

        rx.await
            .unwrap_or(Err(TransportError::ConnectorGone(connector_id)))
    }

    pub fn summary(&self) -> serde_json::Value {
        let now = Instant::now();
        let entries: Vec<_> = self
            .connectors
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "connector_id": entry.key().as_str(),
                    "tenant_id": entry.tenant_id.as_str(),
                    "binary_size_threshold": entry.binary_size_threshold,
                    "connected_secs": now.duration_since(entry.connected_at).as_secs(),
                    "last_seen_secs": now.duration_since(entry.last_seen).as_secs(),
                    "failures": entry.failures,
                })
            })
            .collect();
        serde_json::json!({ "count": entries.len(), "connectors": entries })
    }
}

async fn run(
    mut socket: RouterSocket,
    connectors: Arc<DashMap<ConnectorId, ConnectorInfo>>,
    mut cmd_rx: mpsc::Receiver<HubCommand>,
    stale_threshold: Duration,
    max_failures: u32,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let mut cleanup = tokio::time::interval(Duration::from_secs(10));
    cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(HubCommand::Transmit { connector_id, message, reply }) => {
                        let result = send_to(&mut socket, &connector_id, &message).await;
                        if result.is_err() {
                            if let Some(mut entry) = connectors.get_mut(&connector_id) {
                                entry.failures += 1;
                            }
                        }
                        let _ = reply.send(result);
                    }
                    None => {
                        debug!("hub command channel closed, ROUTER task exiting");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Ok(msg) => handle_inbound(&connectors, msg),
                    Err(e) => warn!("hub ROUTER receive error: {}", e),
                }
            }

            _ = cleanup.tick() => {
                let now = Instant::now();
                connectors.retain(|id, info| {
                    let keep = now.duration_since(info.last_seen) <= stale_threshold
                        && info.failures < max_failures;
                    if !keep {
                        warn!("evicting stale connector {}", id.as_str());
                    }
                    keep
                });
            }

            _ = shutdown.cancelled() => {
                info!("hub ROUTER shutting down");
                break;
            }
        }
    }
}

fn handle_inbound(connectors: &Arc<DashMap<ConnectorId, ConnectorInfo>>, msg: ZmqMessage) {
    let Some(identity) = msg.get(0) else {
        warn!("hub message missing identity frame");
        return;
    };
    let identity = Bytes::copy_from_slice(identity);
    let Some(payload) = msg.get(1) else {
        warn!("hub message missing payload frame");
        return;
    };
    let Ok(payload_str) = std::str::from_utf8(payload) else {
        warn!("hub payload frame is not valid UTF-8");
        return;
    };

    let control: HubControl = match serde_json::from_str(payload_str) {
        Ok(c) => c,
        Err(e) => {
            warn!("failed to decode hub control frame: {}", e);
            return;
        }
    };

    let connector_id = ConnectorId::new(hex::encode(&identity));
    match control {
        HubControl::Hello {
            tenant_id,
            binary_size_threshold,
        } => {
            let now = Instant::now();
            info!(
                connector = connector_id.as_str(),
                tenant = tenant_id.as_str(),
                "connector connected"
            );
            connectors.insert(
                connector_id,
                ConnectorInfo {
                    tenant_id,
                    binary_size_threshold,
                    connected_at: now,
                    last_seen: now,
                    failures: 0,
                },
            );
        }
        HubControl::Heartbeat => {
            if let Some(mut entry) = connectors.get_mut(&connector_id) {
                entry.last_seen = Instant::now();
                entry.failures = 0;
            }
        }
    }
}

async fn send_to(
    socket: &mut RouterSocket,
    connector_id: &ConnectorId,
    message: &HubMessage,
) -> Result<(), TransportError> {
    let identity = hex::decode(connector_id.as_str())
        .map_err(|_| TransportError::ConnectorGone(connector_id.clone()))?;
    let payload = serde_json::to_string(message)
        .map_err(|e| TransportError::PublishFailed(e.to_string()))?;

    let mut frame = ZmqMessage::from(identity);
    frame.push_back(payload.into_bytes().into());

    socket
        .send(frame)
        .await
        .map_err(|e| TransportError::PublishFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_with(entries: Vec<(&str, &str, u64)>) -> HubTransport {
        let connectors = Arc::new(DashMap::new());
        let now = Instant::now();
        for (id, tenant, threshold) in entries {
            connectors.insert(
                ConnectorId::new(id),
                ConnectorInfo {
                    tenant_id: TenantId::new(tenant),
                    binary_size_threshold: threshold,
                    connected_at: now,
                    last_seen: now,
                    failures: 0,
                },
            );
        }
        let (cmd_tx, _cmd_rx) = mpsc::channel(1);
        HubTransport { connectors, cmd_tx }
    }

    #[test]
    fn connectors_for_tenant_filters_by_tenant() {
        let transport = transport_with(vec![
            ("aa", "t1", 1024),
            ("bb", "t2", 2048),
            ("cc", "t1", 4096),
        ]);
        let mut ids: Vec<_> = transport
            .connectors_for_tenant(&TenantId::new("t1"))
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["aa".to_string(), "cc".to_string()]);
    }

    #[test]
    fn binary_size_threshold_is_the_minimum() {
        let transport = transport_with(vec![("aa", "t1", 4096), ("bb", "t1", 1024)]);
        assert_eq!(
            transport.binary_size_threshold_for_tenant(&TenantId::new("t1")),
            Some(1024)
        );
    }

    #[test]
    fn no_connectors_is_none() {
        let transport = transport_with(vec![]);
        assert_eq!(
            transport.binary_size_threshold_for_tenant(&TenantId::new("t1")),
            None
        );
    }
}
