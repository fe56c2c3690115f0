//! ConnectorTransport (C3), connector side: a ZMQ DEALER socket dialed into
//! the server's hub ROUTER (`relay_server::transport::hub`). One socket
//! owned by one task, JSON-framed request/reply - except here the server,
//! not this connector, initiates each `RequestTarget`/`Configure`
//! invocation; this side only sends `HubControl` and receives `HubMessage`.
//!
//! No identity frame on this side of the wire: the ROUTER socket prepends
//! the connector's identity when receiving and strips it when sending back,
//! so the DEALER only ever sees a single payload part.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use relay_proto::{HubControl, HubMessage, TenantConfig, TenantId};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::broker_client::BrokerPublisher;
use crate::target::TargetHandler;

/// One connected hub session: a dialed DEALER socket that has completed its
/// `Hello` handshake.
pub struct HubSession {
    socket: DealerSocket,
}

impl HubSession {
    pub async fn connect(endpoint: &str, tenant_id: &TenantId, binary_size_threshold: u64) -> Result<Self> {
        let mut socket = DealerSocket::new();
        socket
            .connect(endpoint)
            .await
            .with_context(|| format!("failed to connect hub DEALER to {endpoint}"))?;

        let mut session = Self { socket };
        session
            .send_control(&HubControl::Hello {
                tenant_id: tenant_id.clone(),
                binary_size_threshold,
            })
            .await?;
        Ok(session)
    }

    async fn send_control(&mut self, control: &HubControl) -> Result<()> {
        let payload = serde_json::to_vec(control).context("failed to encode hub control frame")?;
        self.socket
            .send(ZmqMessage::from(payload))
            .await
            .context("failed to send hub control frame")?;
        Ok(())
    }

    pub async fn send_heartbeat(&mut self) -> Result<()> {
        self.send_control(&HubControl::Heartbeat).await
    }

    async fn recv(&mut self) -> Result<HubMessage> {
        let msg = self.socket.recv().await.context("hub DEALER receive error")?;
        let payload = msg.get(0).context("hub message missing payload frame")?;
        let message: HubMessage = serde_json::from_slice(payload).context("failed to decode hub message")?;
        Ok(message)
    }
}

/// Drives one session's recv loop: heartbeats on the tenant's configured
/// interval, dispatches each inbound `RequestTarget` to its own task (so a
/// slow target doesn't stall the next heartbeat or recv), applies
/// `Configure` updates in place, until the socket errors or `close` fires.
#[allow(clippy::too_many_arguments)]
pub async fn run_session(
    session: &mut HubSession,
    broker: &BrokerPublisher,
    tenant_config: Arc<Mutex<TenantConfig>>,
    binary_size_threshold: u64,
    handler: Arc<dyn TargetHandler>,
    body_store: Arc<dyn relay_bodystore::BodyStore>,
    close: CancellationToken,
) -> Result<()> {
    let mut heartbeat = tokio::time::interval(tenant_config.lock().unwrap().keep_alive_interval());
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = close.cancelled() => return Ok(()),

            _ = heartbeat.tick() => {
                session.send_heartbeat().await?;
            }

            result = session.recv() => {
                match result? {
                    HubMessage::Configure(new_config) => {
                        let interval = new_config.keep_alive_interval();
                        *tenant_config.lock().unwrap() = new_config;
                        heartbeat = tokio::time::interval(interval);
                        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                        debug!("tenant config updated");
                    }
                    HubMessage::RequestTarget(mut request) => {
                        // Enrich with the locally cached tracing flag (logical OR):
                        // `Configure` may have changed it since the server dispatched.
                        request.enable_tracing = tenant_config.lock().unwrap().resolve_tracing(request.enable_tracing);
                        let handler = handler.clone();
                        let broker = broker.clone();
                        let body_store = body_store.clone();
                        tokio::spawn(async move {
                            crate::target::dispatch(request, handler, broker, body_store, binary_size_threshold).await;
                        });
                    }
                }
            }
        }
    }
}
