//! Client-request / target-response interceptor pipeline.
//!
//! Modeled as a plain ordered `Vec<Arc<dyn ...>>` on `RelayMiddleware` rather
//! than any dependency-injection container — a plainer Rust idiom suffices
//! here.

use std::any::Any;

use async_trait::async_trait;
use relay_proto::{RelayRequest, TargetResponse};

/// Release-on-drop bag for anything displaced mid-pipeline that must outlive
/// the call that displaced it — swapped-out body bytes, coordinator waiter
/// guards. Rust's ownership already gives deterministic release on scope
/// exit; this just lets heterogeneous guards share one per-request lifetime
/// instead of threading a separate field through the pipeline for each.
#[derive(Default)]
pub struct DisposableBag(Vec<Box<dyn Any + Send>>);

impl DisposableBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, disposable: impl Any + Send) {
        self.0.push(Box::new(disposable));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-request mutable state threaded through the interceptor pipeline.
pub struct RelayContext {
    pub request: RelayRequest,
    /// Set by a client-request interceptor to short-circuit dispatch. May
    /// coexist with `force_connector_delivery`.
    pub response: Option<TargetResponse>,
    /// When set alongside `response`, `DeliverToConnector` still runs and the
    /// connector's eventual response overwrites `response`.
    pub force_connector_delivery: bool,
    pub disposables: DisposableBag,
}

impl RelayContext {
    pub fn new(request: RelayRequest) -> Self {
        Self {
            request,
            response: None,
            force_connector_delivery: false,
            disposables: DisposableBag::new(),
        }
    }
}

/// Runs before dispatch. May mutate the request in place, set `response` to
/// short-circuit delivery, or set `force_connector_delivery`.
#[async_trait]
pub trait ClientRequestInterceptor: Send + Sync {
    async fn intercept(&self, ctx: &mut RelayContext);
}

/// Runs after a response is available (whether short-circuited or fetched
/// from the connector), before it's written to the caller.
#[async_trait]
pub trait TargetResponseInterceptor: Send + Sync {
    async fn intercept(&self, ctx: &mut RelayContext);
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_proto::{OriginId, TenantId};

    struct SetsHeader;

    #[async_trait]
    impl ClientRequestInterceptor for SetsHeader {
        async fn intercept(&self, ctx: &mut RelayContext) {
            ctx.request.headers.push("X-Relay-Seen", "1");
        }
    }

    #[tokio::test]
    async fn interceptor_mutates_request_headers() {
        let request = RelayRequest::builder(TenantId::new("t1"), OriginId::new()).build();
        let mut ctx = RelayContext::new(request);
        SetsHeader.intercept(&mut ctx).await;
        assert_eq!(ctx.request.headers.get("x-relay-seen"), Some("1"));
    }

    #[test]
    fn disposable_bag_tracks_length() {
        let mut bag = DisposableBag::new();
        assert!(bag.is_empty());
        bag.push(42usize);
        assert_eq!(bag.len(), 1);
    }
}
