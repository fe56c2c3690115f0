//! Public edge server for the relay.
//!
//! Ties together the ingress pipeline (C8), the tenant dispatcher (C5), the
//! response/acknowledge coordinators (C6/C7), and the two transports that
//! reach a connector: the hub (C3, direct push over a ZMQ ROUTER) and the
//! broker (C4, ZMQ PUB/SUB consumption of responses/acks addressed to this
//! server's `OriginId`).

pub mod coordinator;
pub mod healthz;
pub mod ingress;
pub mod telemetry;
pub mod tenant;
pub mod transport;

pub use tenant::{TenantEntry, TenantRegistry};
