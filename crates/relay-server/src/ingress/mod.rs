//! RelayMiddleware (C8): orchestrates a single public HTTP call end to end —
//! parse, intercept, dispatch, wait, intercept the response, write.
//!
//! Wired as an axum fallback handler rather than a named route, so unknown
//! tenants and non-relay paths fall through to a plain 404 ("pass through to
//! the next handler"); this standalone server has no further handler behind
//! it, so "pass through" here just means "this wasn't a relay URL".

pub mod body;
pub mod error;
pub mod interceptor;

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use relay_bodystore::BodyStore;
use relay_proto::{BodyContent, Headers, HttpMethod, OriginId, RelayRequest, RequestId, TenantId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::coordinator::response::ResolvedBody;
use crate::coordinator::{AcknowledgeCoordinator, RequestCoordinator, ResponseCoordinator};
use crate::tenant::TenantRegistry;
use body::{drain_rewindable, SpooledBody};
use error::IngressError;
use interceptor::{ClientRequestInterceptor, DisposableBag, RelayContext, TargetResponseInterceptor};

pub struct RelayMiddleware {
    origin_id: OriginId,
    tenants: TenantRegistry,
    response_coordinator: ResponseCoordinator,
    acknowledge_coordinator: AcknowledgeCoordinator,
    request_coordinator: RequestCoordinator,
    body_store: Arc<dyn BodyStore>,
    spool_bound: u64,
    scratch_dir: PathBuf,
    client_interceptors: Vec<Arc<dyn ClientRequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn TargetResponseInterceptor>>,
}

impl RelayMiddleware {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        origin_id: OriginId,
        tenants: TenantRegistry,
        response_coordinator: ResponseCoordinator,
        acknowledge_coordinator: AcknowledgeCoordinator,
        request_coordinator: RequestCoordinator,
        body_store: Arc<dyn BodyStore>,
        spool_bound: u64,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            origin_id,
            tenants,
            response_coordinator,
            acknowledge_coordinator,
            request_coordinator,
            body_store,
            spool_bound,
            scratch_dir,
            client_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    pub fn with_client_interceptor(mut self, interceptor: Arc<dyn ClientRequestInterceptor>) -> Self {
        self.client_interceptors.push(interceptor);
        self
    }

    pub fn with_response_interceptor(mut self, interceptor: Arc<dyn TargetResponseInterceptor>) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    /// Step 1-2: route parse + tenant lookup. `None` means "not a relay
    /// URL, or an unknown tenant" — both pass through as a plain 404.
    fn resolve_tenant(&self, path: &str) -> Option<(TenantId, crate::tenant::TenantEntry, String)> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        let (tenant_name, rest) = match trimmed.split_once('/') {
            Some((name, rest)) => (name, rest),
            None => (trimmed, ""),
        };
        if tenant_name.is_empty() {
            return None;
        }
        let (tenant_id, entry) = self.tenants.load_by_name(tenant_name)?;
        Some((tenant_id, entry, format!("/{rest}")))
    }

    #[instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
    pub async fn handle(&self, req: Request) -> Response {
        let path = req.uri().path().to_string();
        let Some((tenant_id, tenant_entry, rest)) = self.resolve_tenant(&path) else {
            debug!(path = %path, "not a relay URL or unknown tenant, passing through");
            return axum::http::StatusCode::NOT_FOUND.into_response();
        };

        match self.handle_for_tenant(tenant_id, tenant_entry, rest, req).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }

    async fn handle_for_tenant(
        &self,
        tenant_id: TenantId,
        tenant_entry: crate::tenant::TenantEntry,
        rest: String,
        req: Request,
    ) -> Result<Response, IngressError> {
        let (parts, body) = req.into_parts();
        let request_id = RequestId::new();

        info!(request_id = %request_id, tenant = %tenant_id, "request received");

        // Step 3: scoped cancellation. Only the expiration timer is modeled
        // explicitly here — caller-abort is handled for free by axum/hyper
        // dropping this whole future on disconnect, which runs no further
        // code except `Drop` impls (the disposable bag below).
        let cancel = CancellationToken::new();
        if let Some(expiration) = tenant_entry.request_expiration {
            let cancel_child = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(expiration).await;
                cancel_child.cancel();
            });
        }

        // Step 4: register waiter + ack slot.
        let waiter = self
            .response_coordinator
            .register_request(request_id)
            .map_err(|e| IngressError::Internal(anyhow::anyhow!(e.to_string())))?;
        let ack_guard = self.acknowledge_coordinator.register(request_id, move |acknowledge_id| {
            debug!(request_id = %request_id, acknowledge_id = %acknowledge_id, "ack consumed");
        });

        let mut bag = DisposableBag::new();
        bag.push(ack_guard);

        // Step 5: buffer the request body.
        let spooled = drain_rewindable(body, self.spool_bound, &self.scratch_dir).await?;
        let body_size = spooled.size();

        // Step 6: build RelayRequest.
        let mut headers = Headers::new();
        for (name, value) in parts.headers.iter() {
            if let Ok(v) = value.to_str() {
                headers.push(name.as_str(), v);
            }
        }
        let headers = headers.without_hop_by_hop();

        let body_content = match &spooled {
            SpooledBody::Memory(bytes) => BodyContent::inline(bytes.clone()),
            SpooledBody::Spilled { .. } => BodyContent::Outsourced,
        };

        let enable_tracing = tenant_entry.config.resolve_tracing(false);

        let mut request = RelayRequest::builder(tenant_id.clone(), self.origin_id)
            .method(HttpMethod::new(parts.method.as_str()))
            .url(rest)
            .headers(headers)
            .query_string(parts.uri.query().map(str::to_string))
            .body(body_content, body_size)
            .enable_tracing(enable_tracing)
            .expiration_ms(tenant_entry.request_expiration.map(|d| d.as_millis() as u64))
            .build();
        request.request_id = request_id;

        let mut ctx = RelayContext::new(request);

        // Step 7: client-request interceptors.
        for interceptor in &self.client_interceptors {
            interceptor.intercept(&mut ctx).await;
        }

        // Step 8: dispatch decision.
        let must_deliver = ctx.response.is_none() || ctx.force_connector_delivery;
        let mut resolved_body: Option<ResolvedBody> = None;

        if must_deliver {
            self.deliver_to_connector(&tenant_id, &mut ctx, spooled).await?;

            if ctx.response.is_none() || ctx.force_connector_delivery {
                match self.response_coordinator.get_response(waiter, &cancel).await {
                    Ok(resolved) => {
                        debug!(request_id = %request_id, "response received");
                        ctx.response = Some(resolved.response);
                        resolved_body = Some(resolved.body);
                    }
                    Err(_cancelled) => {
                        if cancel.is_cancelled() {
                            return Err(IngressError::Timeout);
                        }
                        return Err(IngressError::ClientAbort);
                    }
                }
            }
        } else {
            drop(waiter);
        }

        // Step 9: target-response interceptors.
        for interceptor in &self.response_interceptors {
            interceptor.intercept(&mut ctx).await;
        }

        let response = ctx
            .response
            .take()
            .ok_or_else(|| IngressError::Internal(anyhow::anyhow!("pipeline completed with no response")))?;

        let resolved_body = match resolved_body {
            Some(body) => body,
            None => self.response_coordinator.resolve_body(&response).await,
        };

        // Step 10: write response. `bag` (and everything in it, including
        // the ack guard) is released here as it goes out of scope.
        let http_response = write_response(response, resolved_body)?;
        Ok(http_response)
    }

    /// `DeliverToConnector`: stage the body per `TryInlineBodyContent`, then
    /// push the request through the coordinator.
    async fn deliver_to_connector(
        &self,
        tenant_id: &TenantId,
        ctx: &mut RelayContext,
        spooled: SpooledBody,
    ) -> Result<(), IngressError> {
        let max_inline = self.request_coordinator.binary_size_threshold(tenant_id);
        let body_size = ctx.request.body_size;

        if body_size > max_inline {
            spooled
                .store_into(self.body_store.as_ref(), ctx.request.request_id)
                .await
                .map_err(|e| IngressError::Internal(e.into()))?;
            ctx.request.body = BodyContent::Outsourced;
        } else if !matches!(ctx.request.body, BodyContent::Inline { .. }) {
            let bytes = spooled.into_bytes().await.map_err(|e| IngressError::Internal(e.into()))?;
            ctx.request.body = BodyContent::inline(bytes);
        } else {
            // An interceptor already supplied inline bytes for the request;
            // the drained buffer was only needed for the size decision.
            drop(spooled);
        }

        self.request_coordinator.deliver_request(ctx.request.clone()).await?;
        Ok(())
    }
}

fn write_response(response: relay_proto::TargetResponse, body: ResolvedBody) -> Result<Response, IngressError> {
    let mut builder = axum::http::Response::builder().status(response.status.0);
    for (name, value) in response.headers.without_hop_by_hop().iter() {
        builder = builder.header(name, value);
    }

    let body = match body {
        ResolvedBody::Inline(bytes) => Body::from(bytes),
        ResolvedBody::Streamed(handle) => Body::from_stream(tokio_util::io::ReaderStream::new(handle)),
        ResolvedBody::None => Body::empty(),
    };

    builder
        .body(body)
        .map_err(|e| IngressError::Internal(e.into()))
}

/// axum fallback entry point: `Router::new().fallback(ingress::route)`.
pub async fn route(State(middleware): State<Arc<RelayMiddleware>>, req: Request) -> Response {
    middleware.handle(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::hub::HubTransport;
    use relay_config::{BootstrapConfig, TenantBootstrap};
    use std::collections::HashMap;
    use std::time::Duration;

    async fn test_middleware() -> RelayMiddleware {
        let tmp = tempfile::tempdir().unwrap();
        let body_store: Arc<dyn BodyStore> =
            Arc::new(relay_bodystore::FsBodyStore::at_path(tmp.path()).await.unwrap());

        let shutdown = CancellationToken::new();
        let hub = HubTransport::bind(
            "tcp://127.0.0.1:0".to_string(),
            Duration::from_secs(30),
            3,
            shutdown,
        )
        .await
        .unwrap();

        let mut tenants = HashMap::new();
        tenants.insert("acme".to_string(), TenantBootstrap::default());
        let registry = TenantRegistry::from_bootstrap(&BootstrapConfig { tenants });

        RelayMiddleware::new(
            OriginId::new(),
            registry,
            ResponseCoordinator::new(body_store.clone()),
            AcknowledgeCoordinator::new(),
            RequestCoordinator::new(hub, 1024 * 1024),
            body_store,
            8 * 1024 * 1024,
            tmp.path().to_path_buf(),
        )
    }

    #[tokio::test]
    async fn resolve_tenant_rejects_empty_and_unknown_paths() {
        let middleware = test_middleware().await;
        assert!(middleware.resolve_tenant("/").is_none());
        assert!(middleware.resolve_tenant("/nope/x").is_none());
    }

    #[tokio::test]
    async fn resolve_tenant_splits_tenant_and_rest() {
        let middleware = test_middleware().await;
        let (tenant_id, _entry, rest) = middleware.resolve_tenant("/acme/a/b").unwrap();
        assert_eq!(tenant_id.as_str(), "acme");
        assert_eq!(rest, "/a/b");
    }

    #[tokio::test]
    async fn unknown_tenant_passes_through_as_404() {
        let middleware = test_middleware().await;
        let req = Request::builder()
            .uri("/nope/x")
            .body(Body::empty())
            .unwrap();
        let response = middleware.handle(req).await;
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
