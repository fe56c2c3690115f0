//! Loopback ZMQ roundtrip tests for the connector's hub/broker clients: a
//! mock ROUTER/SUB peer on an incrementing localhost port, no real
//! relay-server process required.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use relay_connector::broker_client::BrokerPublisher;
use relay_connector::hub_client::HubSession;
use relay_proto::{AcknowledgeId, AcknowledgeRequest, HubControl, OriginId, RequestId, TenantId};
use tokio::time::timeout;
use zeromq::{RouterSocket, Socket, SocketRecv, SocketSend, SubSocket};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(16570);

fn next_endpoint() -> String {
    let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("tcp://127.0.0.1:{port}")
}

#[tokio::test]
async fn hub_session_sends_hello_on_connect() {
    let endpoint = next_endpoint();
    let mut router = RouterSocket::new();
    router.bind(&endpoint).await.unwrap();

    let endpoint_clone = endpoint.clone();
    let connect_handle = tokio::spawn(async move {
        HubSession::connect(&endpoint_clone, &TenantId::new("acme"), 4096).await.unwrap()
    });

    let msg = timeout(Duration::from_secs(1), router.recv()).await.unwrap().unwrap();
    let payload = msg.get(1).expect("router recv should see identity + payload");
    let control: HubControl = serde_json::from_slice(payload).unwrap();
    match control {
        HubControl::Hello {
            tenant_id,
            binary_size_threshold,
        } => {
            assert_eq!(tenant_id, TenantId::new("acme"));
            assert_eq!(binary_size_threshold, 4096);
        }
        other => panic!("expected Hello, got {other:?}"),
    }

    let _session = connect_handle.await.unwrap();
}

#[tokio::test]
async fn hub_session_sends_heartbeat() {
    let endpoint = next_endpoint();
    let mut router = RouterSocket::new();
    router.bind(&endpoint).await.unwrap();

    let mut session = HubSession::connect(&endpoint, &TenantId::new("acme"), 4096).await.unwrap();
    let _hello = timeout(Duration::from_secs(1), router.recv()).await.unwrap().unwrap();

    session.send_heartbeat().await.unwrap();
    let msg = timeout(Duration::from_secs(1), router.recv()).await.unwrap().unwrap();
    let payload = msg.get(1).unwrap();
    let control: HubControl = serde_json::from_slice(payload).unwrap();
    assert!(matches!(control, HubControl::Heartbeat));
}

#[tokio::test]
async fn broker_publisher_sends_topic_prefixed_frames() {
    let endpoint = next_endpoint();
    let mut sub = SubSocket::new();
    sub.bind(&endpoint).await.unwrap();
    sub.subscribe("acknowledge.").await.unwrap();

    let publisher = BrokerPublisher::connect(&endpoint).await.unwrap();
    let origin_id = OriginId::new();
    let ack = AcknowledgeRequest {
        request_id: RequestId::new(),
        origin_id,
        acknowledge_id: AcknowledgeId("delivery-1".to_string()),
    };

    // PUB/SUB is a slow joiner: the subscription may not be installed by the
    // time the first publish goes out, so retry until it lands.
    let mut delivered = None;
    for _ in 0..20 {
        publisher.dispatch_acknowledge(origin_id, &ack).await.unwrap();
        if let Ok(Ok(msg)) = timeout(Duration::from_millis(100), sub.recv()).await {
            delivered = Some(msg);
            break;
        }
    }
    let msg = delivered.expect("ack was never delivered to the SUB socket");
    let topic = std::str::from_utf8(msg.get(0).unwrap()).unwrap();
    assert!(topic.starts_with("acknowledge."));
    let decoded: AcknowledgeRequest = serde_json::from_slice(msg.get(1).unwrap()).unwrap();
    assert_eq!(decoded.acknowledge_id, ack.acknowledge_id);
}
