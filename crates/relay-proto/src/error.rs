//! Contract-boundary errors shared by coordinators and transports.

use crate::ids::ConnectorId;
use thiserror::Error;

/// Returned by `RequestCoordinator::deliver_request` and the transports it
/// composes. Maps to a 503 at the edge.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no connector subscribed for tenant")]
    NoConnector,

    #[error("connector {0} dropped before transmit could complete")]
    ConnectorGone(ConnectorId),

    #[error("publish failed: {0}")]
    PublishFailed(String),
}
