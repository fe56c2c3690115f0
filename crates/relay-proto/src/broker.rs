//! Broker topic conventions: per-origin queues for responses and
//! acknowledgements, addressed by ZMQ PUB/SUB topic prefix.

use crate::ids::OriginId;
use serde::{Deserialize, Serialize};

pub const RESPONSE_PREFIX: &str = "response.";
pub const ACKNOWLEDGE_PREFIX: &str = "acknowledge.";

pub fn response_topic(origin_id: OriginId) -> String {
    format!("{RESPONSE_PREFIX}{origin_id}")
}

pub fn acknowledge_topic(origin_id: OriginId) -> String {
    format!("{ACKNOWLEDGE_PREFIX}{origin_id}")
}

/// Parses a topic frame back into its kind and origin, or `None` if it
/// doesn't match either known prefix (the consumer logs and drops the frame
/// rather than treating it as fatal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerTopicKind {
    Response,
    Acknowledge,
}

pub fn parse_topic(topic: &str) -> Option<(BrokerTopicKind, &str)> {
    if let Some(origin) = topic.strip_prefix(RESPONSE_PREFIX) {
        Some((BrokerTopicKind::Response, origin))
    } else if let Some(origin) = topic.strip_prefix(ACKNOWLEDGE_PREFIX) {
        Some((BrokerTopicKind::Acknowledge, origin))
    } else {
        None
    }
}
