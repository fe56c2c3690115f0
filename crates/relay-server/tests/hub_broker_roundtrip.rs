//! End-to-end loopback test over real ZMQ sockets: `RequestCoordinator`
//! dispatches through a bound `HubTransport`, a mock connector (standing in
//! for `relay-connector`'s `HubSession`) answers over a `PubSocket` into a
//! bound `BrokerConsumer`, and the response/acknowledge coordinators resolve
//! the original waiter. An incrementing localhost port stands in for a real
//! connector process; no auxiliary process required.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use relay_bodystore::FsBodyStore;
use relay_proto::{
    broker, AcknowledgeId, AcknowledgeRequest, BodyContent, HttpStatusCode, HubControl, HubMessage, OriginId,
    RelayRequest, TargetResponse, TenantId,
};
use relay_server::coordinator::{AcknowledgeCoordinator, RequestCoordinator, ResponseCoordinator};
use relay_server::transport::{BrokerConsumer, HubTransport};
use tokio_util::sync::CancellationToken;
use zeromq::{DealerSocket, PubSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(17_000);

fn next_endpoint() -> String {
    let port = PORT_COUNTER.fetch_add(2, Ordering::SeqCst);
    format!("tcp://127.0.0.1:{port}")
}

/// Connects a DEALER into `hub_endpoint`, sends `Hello`, then answers the
/// first `RequestTarget` it sees with a fixed response + acknowledge,
/// published into `broker_endpoint`. Mirrors the shape (not the code) of
/// `relay-connector`'s `hub_client`/`broker_client`.
async fn run_mock_connector(hub_endpoint: String, broker_endpoint: String, tenant_id: TenantId) {
    let mut dealer = DealerSocket::new();
    dealer.connect(&hub_endpoint).await.unwrap();

    let hello = HubControl::Hello {
        tenant_id,
        binary_size_threshold: 1024,
    };
    dealer
        .send(ZmqMessage::from(serde_json::to_vec(&hello).unwrap()))
        .await
        .unwrap();

    let msg = dealer.recv().await.unwrap();
    let payload = msg.get(0).expect("dealer recv should see payload frame");
    let HubMessage::RequestTarget(request) = serde_json::from_slice(payload).unwrap() else {
        panic!("expected RequestTarget");
    };

    let response = TargetResponse::success(
        request.request_id,
        request.request_origin_id,
        HttpStatusCode::OK,
        relay_proto::Headers::new(),
        BodyContent::inline(bytes::Bytes::from_static(b"pong")),
        4,
    );
    let ack = AcknowledgeRequest {
        request_id: request.request_id,
        origin_id: request.request_origin_id,
        acknowledge_id: AcknowledgeId("receipt-1".to_string()),
    };

    let mut publisher = PubSocket::new();
    publisher.connect(&broker_endpoint).await.unwrap();

    // PUB/SUB slow joiner: retry both publishes until the SUB side has
    // subscribed, signalled here by the response waiter resolving.
    for _ in 0..50 {
        let mut response_frame = ZmqMessage::from(broker::response_topic(request.request_origin_id).into_bytes());
        response_frame.push_back(serde_json::to_vec(&response).unwrap().into());
        let _ = publisher.send(response_frame).await;

        let mut ack_frame = ZmqMessage::from(broker::acknowledge_topic(request.request_origin_id).into_bytes());
        ack_frame.push_back(serde_json::to_vec(&ack).unwrap().into());
        let _ = publisher.send(ack_frame).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn request_dispatched_through_hub_resolves_via_broker() {
    let hub_endpoint = next_endpoint();
    let broker_endpoint = next_endpoint();
    let tenant_id = TenantId::new("acme");
    let origin_id = OriginId::new();

    let shutdown = CancellationToken::new();
    let hub = HubTransport::bind(hub_endpoint.clone(), Duration::from_secs(30), 3, shutdown.clone())
        .await
        .unwrap();

    let tmp = std::env::temp_dir().join(format!("relay-server-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&tmp).unwrap();
    let body_store: std::sync::Arc<dyn relay_bodystore::BodyStore> =
        std::sync::Arc::new(FsBodyStore::at_path(tmp.as_path()).await.unwrap());

    let response_coordinator = ResponseCoordinator::new(body_store);
    let acknowledge_coordinator = AcknowledgeCoordinator::new();

    let broker_consumer = BrokerConsumer::new(
        broker_endpoint.clone(),
        origin_id,
        response_coordinator.clone(),
        acknowledge_coordinator.clone(),
    );
    let broker_shutdown = shutdown.clone();
    tokio::spawn(broker_consumer.run(broker_shutdown));

    tokio::spawn(run_mock_connector(hub_endpoint, broker_endpoint, tenant_id.clone()));

    // Wait for the mock connector's Hello to register before dispatching.
    let request_coordinator = RequestCoordinator::new(hub.clone(), 2048);
    let mut attempts = 0;
    while hub.connectors_for_tenant(&tenant_id).is_empty() {
        attempts += 1;
        assert!(attempts < 100, "mock connector never registered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let request = RelayRequest::builder(tenant_id, origin_id)
        .url("/ping".to_string())
        .build();
    let request_id = request.request_id;

    let response_guard = response_coordinator.register_request(request_id).unwrap();
    let ack_received = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let ack_received_clone = ack_received.clone();
    let _ack_guard = acknowledge_coordinator.register(request_id, move |_ack_id| {
        ack_received_clone.store(true, std::sync::atomic::Ordering::SeqCst);
    });

    request_coordinator.deliver_request(request).await.unwrap();

    let cancel = CancellationToken::new();
    let resolved = tokio::time::timeout(Duration::from_secs(5), response_coordinator.get_response(response_guard, &cancel))
        .await
        .expect("response coordinator timed out")
        .expect("response was cancelled");

    assert_eq!(resolved.response.status, HttpStatusCode::OK);
    assert!(matches!(resolved.body, relay_server::coordinator::response::ResolvedBody::Inline(b) if b == bytes::Bytes::from_static(b"pong")));

    let mut waited = 0;
    while !ack_received.load(std::sync::atomic::Ordering::SeqCst) {
        waited += 1;
        assert!(waited < 100, "acknowledge never arrived");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown.cancel();
    std::fs::remove_dir_all(&tmp).ok();
}
