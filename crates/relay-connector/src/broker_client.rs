//! ServerTransport (C4), publish side: a ZMQ PUB socket connected to the
//! server's broker SUB (`relay_server::transport::broker::BrokerConsumer`).
//! The SUB side is the stable rendezvous point and binds; this side
//! connects. Keeps the same mpsc-fed, single-owner-task shape as
//! `relay_server::transport::hub` so the socket is never shared across
//! concurrent dispatch callers.

use anyhow::{Context, Result};
use relay_proto::{broker, AcknowledgeRequest, OriginId, TargetResponse};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use zeromq::{PubSocket, Socket, SocketSend, ZmqMessage};

enum BrokerCommand {
    Publish {
        topic: String,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), String>>,
    },
}

/// Handle to the running broker publisher. Cheap to clone; all clones share
/// the one connected PUB socket via a command channel.
#[derive(Clone)]
pub struct BrokerPublisher {
    cmd_tx: mpsc::Sender<BrokerCommand>,
}

impl BrokerPublisher {
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let mut socket = PubSocket::new();
        socket
            .connect(endpoint)
            .await
            .with_context(|| format!("failed to connect broker PUB to {endpoint}"))?;
        info!(endpoint, "broker PUB connected");

        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        tokio::spawn(run(socket, cmd_rx));
        Ok(Self { cmd_tx })
    }

    pub async fn dispatch_response(&self, origin_id: OriginId, response: &TargetResponse) -> Result<()> {
        let topic = broker::response_topic(origin_id);
        let payload = serde_json::to_vec(response).context("failed to encode TargetResponse")?;
        self.publish(topic, payload).await
    }

    pub async fn dispatch_acknowledge(&self, origin_id: OriginId, ack: &AcknowledgeRequest) -> Result<()> {
        let topic = broker::acknowledge_topic(origin_id);
        let payload = serde_json::to_vec(ack).context("failed to encode AcknowledgeRequest")?;
        self.publish(topic, payload).await
    }

    async fn publish(&self, topic: String, payload: Vec<u8>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(BrokerCommand::Publish { topic, payload, reply })
            .await
            .context("broker publisher task is gone")?;
        rx.await
            .context("broker publisher task dropped reply channel")?
            .map_err(anyhow::Error::msg)
    }
}

async fn run(mut socket: PubSocket, mut cmd_rx: mpsc::Receiver<BrokerCommand>) {
    while let Some(BrokerCommand::Publish { topic, payload, reply }) = cmd_rx.recv().await {
        let mut frame = ZmqMessage::from(topic.into_bytes());
        frame.push_back(payload.into());
        let result = socket.send(frame).await.map_err(|e| e.to_string());
        if result.is_err() {
            warn!("broker PUB send failed");
        }
        let _ = reply.send(result);
    }
}
