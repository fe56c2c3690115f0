//! AcknowledgeCoordinator (C7): same slot-per-`RequestId` shape as
//! [`crate::coordinator::response::ResponseCoordinator`], with one addition —
//! registration carries a callback to invoke exactly once when the matching
//! `AcknowledgeRequest` arrives (typically a durable broker's native ack;
//! here, the ingress pipeline's default callback just emits the `ack
//! consumed` log event, since the HTTP caller that originated the request
//! has no message-queue receipt of its own to settle).

use std::sync::Arc;

use dashmap::DashMap;
use relay_proto::{AcknowledgeId, AcknowledgeRequest, RequestId};
use tracing::warn;

type AckCallback = Box<dyn FnOnce(AcknowledgeId) + Send>;

struct Inner {
    slots: DashMap<RequestId, AckCallback>,
}

/// Disposable returned by `register`. Drops the slot if the ack never
/// arrives (e.g. the HTTP request itself times out or the caller aborts
/// before the connector acknowledges).
pub struct AckGuard {
    inner: Arc<Inner>,
    request_id: RequestId,
}

impl Drop for AckGuard {
    fn drop(&mut self) {
        self.inner.slots.remove(&self.request_id);
    }
}

#[derive(Clone)]
pub struct AcknowledgeCoordinator {
    inner: Arc<Inner>,
}

impl AcknowledgeCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner { slots: DashMap::new() }),
        }
    }

    /// Reserve a slot for `request_id`, with `callback` to run on first
    /// arrival. At most one live registration per id.
    pub fn register(
        &self,
        request_id: RequestId,
        callback: impl FnOnce(AcknowledgeId) + Send + 'static,
    ) -> AckGuard {
        self.inner.slots.insert(request_id, Box::new(callback));
        AckGuard {
            inner: self.inner.clone(),
            request_id,
        }
    }

    /// Called by the broker consumer when an `AcknowledgeRequest` lands.
    /// Invokes the registered callback once and removes the slot. A second
    /// arrival for the same id after the first is a no-op: at-least-once
    /// delivery allows duplicates, and idempotence is the contract.
    pub fn process_acknowledge(&self, ack: AcknowledgeRequest) {
        match self.inner.slots.remove(&ack.request_id) {
            Some((_, callback)) => callback(ack.acknowledge_id),
            None => {
                warn!(
                    request_id = %ack.request_id,
                    "acknowledge arrived with no registered callback (duplicate or already expired)"
                );
            }
        }
    }

    /// Callbacks currently registered, surfaced on `/healthz`.
    pub fn pending_count(&self) -> usize {
        self.inner.slots.len()
    }
}

impl Default for AcknowledgeCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
