//! Connector agent for the relay.
//!
//! The mirror image of `relay-server`: dials the hub as a ZMQ DEALER
//! (`hub_client`), connects a PUB socket into the server's broker SUB
//! (`broker_client`), and drives the session lifecycle (`connection`, C9 -
//! `ConnectorConnection`) that reconnects with backoff when either leg
//! drops. Each inbound `RequestTarget` is handed to a local `TargetHandler`
//! (`target`), whose result is published back as a `TargetResponse` plus a
//! delivery acknowledge.

pub mod broker_client;
pub mod connection;
pub mod hub_client;
pub mod target;
pub mod telemetry;
