//! Hub envelope: the two server→connector invocations, plus the connector's
//! own control messages on the same channel.
//!
//! A tagged enum on the wire (`#[serde(tag = "kind", rename_all =
//! "snake_case")]`), so adding a variant is a non-breaking wire change.

use crate::ids::TenantId;
use crate::request::RelayRequest;
use crate::tenant::TenantConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HubMessage {
    /// Deliver a relay request for the connector's local target to handle.
    RequestTarget(RelayRequest),
    /// Update keep-alive/reconnect policy, and possibly tracing.
    Configure(TenantConfig),
}

/// Connector→server control messages on the hub channel. Distinct from
/// [`HubMessage`], which only ever flows server→connector: establishing
/// identity/tenant membership and liveness checks are the connector's side
/// of the same duplex channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HubControl {
    /// Sent once, right after the hub session opens: declares which tenant
    /// this connector serves and the inline-body ceiling it will accept
    /// before asking for an outsourced body instead.
    Hello {
        tenant_id: TenantId,
        binary_size_threshold: u64,
    },
    /// Application-level liveness ping; a successful ROUTER round-trip is
    /// the only acknowledgement needed.
    Heartbeat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::OriginId;

    #[test]
    fn request_target_roundtrips() {
        let req = RelayRequest::builder(TenantId::new("t1"), OriginId::new()).build();
        let msg = HubMessage::RequestTarget(req);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"kind\":\"request_target\""));
        let _parsed: HubMessage = serde_json::from_str(&json).unwrap();
    }

    #[test]
    fn configure_roundtrips() {
        let msg = HubMessage::Configure(TenantConfig::default());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"kind\":\"configure\""));
    }

    #[test]
    fn hello_roundtrips() {
        let msg = HubControl::Hello {
            tenant_id: TenantId::new("t1"),
            binary_size_threshold: 1024,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"kind\":\"hello\""));
        let _parsed: HubControl = serde_json::from_str(&json).unwrap();
    }
}
