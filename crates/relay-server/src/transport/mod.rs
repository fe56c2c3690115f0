//! The two transports a server instance uses to reach/hear from connectors:
//! the hub (direct push, C3) and the broker (pub/sub consumption, half of
//! C4 — the other half, publishing, lives in `relay-connector` since it's
//! the connector that owns outbound responses/acks).

pub mod broker;
pub mod hub;

pub use broker::BrokerConsumer;
pub use hub::HubTransport;
