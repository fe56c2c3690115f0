//! `AcknowledgeRequest`: a transport-level delivery receipt, connector → server.

use crate::ids::{OriginId, RequestId};
use serde::{Deserialize, Serialize};

/// Opaque transport-specific receipt (e.g. a broker delivery tag). The core
/// never interprets it, only forwards it to the registered ack callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcknowledgeId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeRequest {
    pub request_id: RequestId,
    pub origin_id: OriginId,
    pub acknowledge_id: AcknowledgeId,
}
