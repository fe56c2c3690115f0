//! ServerTransport (C4), consumer half: a ZMQ SUB socket bound for connectors
//! to publish into, subscribed only to this origin's two topics
//! (`response.{OriginId}`, `acknowledge.{OriginId}`) — ZMQ's native
//! prefix-subscription gives "each server instance consumes only from its
//! own queues" for free. SUB binds and PUB connects here, since the server
//! is the stable rendezvous point and connectors come and go.
//!
//! The publish half of C4 (`DispatchResponse`) lives in `relay-connector`,
//! since it's the connector that produces responses/acks; this module only
//! ever receives.

use anyhow::{Context, Result};
use relay_proto::broker::BrokerTopicKind;
use relay_proto::{broker, AcknowledgeRequest, OriginId, TargetResponse};
use tracing::{debug, info, warn};
use zeromq::{Socket, SocketRecv, SubSocket, ZmqMessage};

use crate::coordinator::{AcknowledgeCoordinator, ResponseCoordinator};

/// Binds the broker SUB socket and runs its consume loop until shutdown.
pub struct BrokerConsumer {
    bind_address: String,
    origin_id: OriginId,
    response_coordinator: ResponseCoordinator,
    acknowledge_coordinator: AcknowledgeCoordinator,
}

impl BrokerConsumer {
    pub fn new(
        bind_address: String,
        origin_id: OriginId,
        response_coordinator: ResponseCoordinator,
        acknowledge_coordinator: AcknowledgeCoordinator,
    ) -> Self {
        Self {
            bind_address,
            origin_id,
            response_coordinator,
            acknowledge_coordinator,
        }
    }

    /// Bind and consume until `shutdown` fires. Each decoded frame is handed
    /// straight to the matching coordinator; frames that fail to decode are
    /// logged and dropped rather than treated as fatal.
    pub async fn run(self, shutdown: tokio_util::sync::CancellationToken) -> Result<()> {
        let mut socket = SubSocket::new();
        socket
            .bind(&self.bind_address)
            .await
            .with_context(|| format!("failed to bind broker SUB to {}", self.bind_address))?;

        let response_topic = broker::response_topic(self.origin_id);
        let acknowledge_topic = broker::acknowledge_topic(self.origin_id);
        socket
            .subscribe(&response_topic)
            .await
            .context("failed to subscribe to response topic")?;
        socket
            .subscribe(&acknowledge_topic)
            .await
            .context("failed to subscribe to acknowledge topic")?;

        info!(
            bind = %self.bind_address,
            origin = %self.origin_id,
            "broker SUB listening"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("broker SUB shutting down");
                    return Ok(());
                }
                result = socket.recv() => {
                    match result {
                        Ok(msg) => self.handle_frame(msg),
                        Err(e) => warn!("broker SUB receive error: {}", e),
                    }
                }
            }
        }
    }

    fn handle_frame(&self, msg: ZmqMessage) {
        let Some(topic) = msg.get(0) else {
            warn!("broker frame missing topic part");
            return;
        };
        let Ok(topic) = std::str::from_utf8(topic) else {
            warn!("broker topic frame is not valid UTF-8");
            return;
        };
        let Some((kind, _origin)) = broker::parse_topic(topic) else {
            warn!(topic, "broker frame has unrecognized topic, dropping");
            return;
        };
        let Some(payload) = msg.get(1) else {
            warn!(topic, "broker frame missing payload part");
            return;
        };

        match kind {
            BrokerTopicKind::Response => match serde_json::from_slice::<TargetResponse>(payload) {
                Ok(response) => {
                    debug!(request_id = %response.request_id, "response received");
                    self.response_coordinator.process_response(response);
                }
                Err(e) => warn!("failed to decode TargetResponse frame: {}", e),
            },
            BrokerTopicKind::Acknowledge => match serde_json::from_slice::<AcknowledgeRequest>(payload) {
                Ok(ack) => {
                    debug!(request_id = %ack.request_id, "ack consumed");
                    self.acknowledge_coordinator.process_acknowledge(ack);
                }
                Err(e) => warn!("failed to decode AcknowledgeRequest frame: {}", e),
            },
        }
    }
}
