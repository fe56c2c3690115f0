//! ResponseCoordinator (C6): registers pending requests and matches arriving
//! broker responses back to the worker awaiting them.
//!
//! The map is a `dashmap::DashMap<RequestId, Slot>` — striped locking gives
//! "no single waiter contends with another" for free. Correlation itself is
//! a oneshot channel per request, but there is no single task owning a
//! socket here — `ProcessResponse` is invoked directly from the broker
//! consumer loop, and `DashMap`'s CAS semantics keep registration/fulfilment
//! atomic per id without a global lock.

use std::sync::Arc;

use dashmap::DashMap;
use relay_bodystore::{BodyHandle, BodyStore};
use relay_proto::{RequestId, TargetResponse};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

type Slot = oneshot::Sender<TargetResponse>;

/// Registration was attempted twice for the same id — a waiter is already
/// installed (testable property 3: at most one waiter per id, ever).
#[derive(Debug, thiserror::Error)]
#[error("a waiter is already registered for request {0}")]
pub struct AlreadyRegistered(pub RequestId);

/// `GetResponse` was cancelled (caller abort or expiration) before a response
/// arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// The body half of a resolved response: either it travelled inline, or it
/// was outsourced and the coordinator has opened a `BodyStore` handle to it.
pub enum ResolvedBody {
    Inline(bytes::Bytes),
    Streamed(BodyHandle),
    /// No body (e.g. a HEAD-shaped response, or a failed/expired one).
    None,
}

pub struct ResolvedResponse {
    pub response: TargetResponse,
    pub body: ResolvedBody,
}

/// Disposable returned by `register_request`. Removes the slot on drop —
/// idempotent, since `process_response` may already have removed it. Carries
/// the receiving half so `get_response` has something to await without a
/// second lookup.
pub struct WaiterGuard {
    coordinator: Arc<Inner>,
    request_id: RequestId,
    rx: Option<oneshot::Receiver<TargetResponse>>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.coordinator.slots.remove(&self.request_id);
    }
}

struct Inner {
    slots: DashMap<RequestId, Slot>,
    body_store: Arc<dyn BodyStore>,
}

/// In-memory registry matching asynchronous `TargetResponse` arrivals to
/// the HTTP worker waiting on the corresponding `RequestId`.
#[derive(Clone)]
pub struct ResponseCoordinator {
    inner: Arc<Inner>,
}

impl ResponseCoordinator {
    pub fn new(body_store: Arc<dyn BodyStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: DashMap::new(),
                body_store,
            }),
        }
    }

    /// Reserve a slot for `request_id`. At most one live waiter per id is
    /// ever allowed — a second call before the first is dropped is rejected.
    pub fn register_request(&self, request_id: RequestId) -> Result<WaiterGuard, AlreadyRegistered> {
        use dashmap::mapref::entry::Entry;

        let (tx, rx) = oneshot::channel();
        match self.inner.slots.entry(request_id) {
            Entry::Occupied(_) => Err(AlreadyRegistered(request_id)),
            Entry::Vacant(slot) => {
                slot.insert(tx);
                Ok(WaiterGuard {
                    coordinator: self.inner.clone(),
                    request_id,
                    rx: Some(rx),
                })
            }
        }
    }

    /// Single-consumer await for the response matching `request_id`, racing
    /// against `cancel`. Returns `Cancelled` if `cancel` fires first. Consumes
    /// the guard: whether this resolves or is cancelled, the slot is gone
    /// once it returns.
    pub async fn get_response(
        &self,
        mut guard: WaiterGuard,
        cancel: &CancellationToken,
    ) -> Result<ResolvedResponse, Cancelled> {
        let rx = guard.rx.take().expect("get_response called once per guard");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            result = rx => result.map_err(|_| Cancelled)?,
        };

        let body = self.resolve_body(&response).await;
        Ok(ResolvedResponse { response, body })
    }

    /// Resolve the body half of a `TargetResponse` that didn't come through
    /// `get_response` — used by the ingress pipeline when a client-request
    /// interceptor short-circuits delivery with its own response.
    pub async fn resolve_body(&self, response: &TargetResponse) -> ResolvedBody {
        if let Some(bytes) = response.body.as_inline() {
            return ResolvedBody::Inline(bytes.clone());
        }
        if response.is_outsourced() {
            return match self.inner.body_store.open_response_body(response.request_id).await {
                Ok(handle) => ResolvedBody::Streamed(handle),
                Err(e) => {
                    warn!(request_id = %response.request_id, error = %e, "failed to open outsourced response body");
                    ResolvedBody::None
                }
            };
        }
        ResolvedBody::None
    }

    /// Called by the broker consumer when a `TargetResponse` lands. Fulfils
    /// the matching waiter if one exists; otherwise the response is dropped
    /// with a warning (the originating server instance's waiter is gone).
    pub fn process_response(&self, response: TargetResponse) {
        if let Some((_, tx)) = self.inner.slots.remove(&response.request_id) {
            let _ = tx.send(response);
        } else {
            warn!(request_id = %response.request_id, "response arrived with no registered waiter");
        }
    }

    /// Waiters currently registered, surfaced on `/healthz`.
    pub fn pending_count(&self) -> usize {
        self.inner.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_proto::{BodyContent, HttpStatusCode, OriginId};

    async fn coordinator() -> ResponseCoordinator {
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn BodyStore> = Arc::new(relay_bodystore::FsBodyStore::at_path(tmp.path()).await.unwrap());
        ResponseCoordinator::new(store)
    }

    fn response(request_id: RequestId, body: BodyContent) -> TargetResponse {
        TargetResponse::success(
            request_id,
            OriginId::new(),
            HttpStatusCode(200),
            relay_proto::Headers::new(),
            body,
            0,
        )
    }

    #[tokio::test]
    async fn second_registration_before_first_resolves_is_rejected() {
        let coordinator = coordinator().await;
        let request_id = RequestId::new();
        let _first = coordinator.register_request(request_id).unwrap();
        let second = coordinator.register_request(request_id);
        assert!(matches!(second, Err(AlreadyRegistered(id)) if id == request_id));
    }

    #[tokio::test]
    async fn process_response_fulfils_the_matching_waiter() {
        let coordinator = coordinator().await;
        let request_id = RequestId::new();
        let guard = coordinator.register_request(request_id).unwrap();

        coordinator.process_response(response(request_id, BodyContent::inline(bytes::Bytes::from_static(b"ok"))));

        let cancel = CancellationToken::new();
        let resolved = coordinator.get_response(guard, &cancel).await.unwrap();
        assert!(matches!(resolved.body, ResolvedBody::Inline(b) if b == bytes::Bytes::from_static(b"ok")));
    }

    #[tokio::test]
    async fn cancellation_wins_the_race_when_response_never_arrives() {
        let coordinator = coordinator().await;
        let request_id = RequestId::new();
        let guard = coordinator.register_request(request_id).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = coordinator.get_response(guard, &cancel).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn response_with_no_registered_waiter_is_dropped() {
        let coordinator = coordinator().await;
        let request_id = RequestId::new();
        coordinator.process_response(response(request_id, BodyContent::inline(bytes::Bytes::new())));
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn dropping_guard_removes_the_slot() {
        let coordinator = coordinator().await;
        let request_id = RequestId::new();
        let guard = coordinator.register_request(request_id).unwrap();
        assert_eq!(coordinator.pending_count(), 1);
        drop(guard);
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn outsourced_body_resolves_via_body_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn BodyStore> = Arc::new(relay_bodystore::FsBodyStore::at_path(tmp.path()).await.unwrap());
        let coordinator = ResponseCoordinator::new(store.clone());

        let request_id = RequestId::new();
        let mut reader = std::io::Cursor::new(b"streamed".to_vec());
        store.store_response_body(request_id, &mut reader).await.unwrap();

        let resolved = coordinator
            .resolve_body(&response(request_id, BodyContent::Outsourced))
            .await;
        assert!(matches!(resolved, ResolvedBody::Streamed(_)));
    }
}
