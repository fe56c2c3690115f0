//! Wire types for the relay's request/response/acknowledge protocol.
//!
//! Concrete record types rather than open polymorphism over
//! `{ClientRequest, TargetResponse, AcknowledgeRequest}`: plain structs and a
//! JSON wire format.

pub mod ack;
pub mod body;
pub mod broker;
pub mod envelope;
pub mod error;
pub mod headers;
pub mod ids;
pub mod request;
pub mod response;
pub mod tenant;

pub use ack::{AcknowledgeId, AcknowledgeRequest};
pub use body::BodyContent;
pub use envelope::{HubControl, HubMessage};
pub use error::TransportError;
pub use headers::Headers;
pub use ids::{ConnectorId, OriginId, RequestId, TenantId};
pub use request::{HttpMethod, RelayRequest, RelayRequestBuilder};
pub use response::{HttpStatusCode, TargetResponse};
pub use tenant::TenantConfig;
