//! `TargetHandler`: the connector's delegate to the actual private backend.
//!
//! Deliberately thin and opaque past this contract - what happens inside
//! `handle` is entirely up to the implementation. `HttpTargetHandler` below
//! is one concrete implementation, forwarding to a local HTTP target over
//! `reqwest`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use relay_proto::{
    AcknowledgeId, AcknowledgeRequest, BodyContent, Headers, HttpMethod, HttpStatusCode, OriginId, RelayRequest,
    RequestId, TargetResponse,
};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::warn;

use crate::broker_client::BrokerPublisher;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("target handler failed: {0}")]
    Failed(String),
    #[error("target request timed out")]
    Timeout,
}

/// Everything the connector knows about one request, already stripped of
/// hop-by-hop headers and with its body fully materialized.
#[derive(Debug, Clone)]
pub struct TargetInvocation {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub query_string: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

/// The connector's delegate for reaching a tenant's private backend.
/// Implementations are free to do anything here - forward over HTTP, shell
/// out, call a local IPC socket - the connector only cares about the
/// `TargetOutcome`/`TargetError` contract.
#[async_trait]
pub trait TargetHandler: Send + Sync {
    async fn handle(&self, invocation: TargetInvocation) -> Result<TargetOutcome, TargetError>;
}

/// Forwards every invocation to a fixed local HTTP target (e.g.
/// `http://127.0.0.1:3000`), with `invocation.url`'s path/query resolved
/// against it.
pub struct HttpTargetHandler {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpTargetHandler {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self, TargetError> {
        let base_url =
            reqwest::Url::parse(base_url.as_ref()).map_err(|e| TargetError::Failed(format!("invalid target base url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TargetError::Failed(format!("failed to build http client: {e}")))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl TargetHandler for HttpTargetHandler {
    async fn handle(&self, invocation: TargetInvocation) -> Result<TargetOutcome, TargetError> {
        let mut url = self
            .base_url
            .join(&invocation.url)
            .map_err(|e| TargetError::Failed(format!("invalid target path: {e}")))?;
        if let Some(query) = &invocation.query_string {
            url.set_query(Some(query));
        }

        let method = reqwest::Method::from_bytes(invocation.method.as_str().as_bytes())
            .map_err(|e| TargetError::Failed(format!("invalid http method: {e}")))?;

        let mut builder = self.client.request(method, url);
        for (name, value) in invocation.headers.iter() {
            builder = builder.header(name, value);
        }
        if !invocation.body.is_empty() {
            builder = builder.body(invocation.body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TargetError::Timeout
            } else {
                TargetError::Failed(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.push(name.as_str(), value);
            }
        }
        let body = response.bytes().await.map_err(|e| TargetError::Failed(e.to_string()))?;

        Ok(TargetOutcome { status, headers, body })
    }
}

/// Invokes `handler` for one `RelayRequest`: resolves an outsourced request
/// body first if needed, strips hop-by-hop headers, then publishes the
/// resulting `TargetResponse` followed by its delivery acknowledge. Errors
/// at any stage still produce a `TargetResponse` (failed or expired) rather
/// than leaving the server's waiter to time out silently.
#[tracing::instrument(skip_all, fields(request_id = %request.request_id, tracing_enabled = request.enable_tracing))]
pub(crate) async fn dispatch(
    request: RelayRequest,
    handler: Arc<dyn TargetHandler>,
    broker: BrokerPublisher,
    body_store: Arc<dyn relay_bodystore::BodyStore>,
    binary_size_threshold: u64,
) {
    let request_id = request.request_id;
    let origin_id = request.request_origin_id;
    if request.enable_tracing {
        tracing::info!(request_id = %request_id, url = %request.url, "tracing-enabled request dispatched to target");
    }

    let body = match resolve_request_body(&request, &body_store).await {
        Ok(body) => body,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "failed to resolve request body");
            publish_and_ack(&broker, origin_id, request_id, &failed_response(request_id, origin_id)).await;
            return;
        }
    };

    let invocation = TargetInvocation {
        method: request.method.clone(),
        url: request.url.clone(),
        headers: request.headers.without_hop_by_hop(),
        query_string: request.query_string.clone(),
        body,
    };

    let response = match handler.handle(invocation).await {
        Ok(outcome) => build_response(request_id, origin_id, outcome, binary_size_threshold, &body_store).await,
        Err(TargetError::Timeout) => expired_response(request_id, origin_id),
        Err(TargetError::Failed(message)) => {
            warn!(request_id = %request_id, error = %message, "target handler failed");
            failed_response(request_id, origin_id)
        }
    };

    publish_and_ack(&broker, origin_id, request_id, &response).await;
}

async fn resolve_request_body(
    request: &RelayRequest,
    body_store: &Arc<dyn relay_bodystore::BodyStore>,
) -> Result<Bytes, TargetError> {
    match &request.body {
        BodyContent::Inline { bytes } => Ok(bytes.clone()),
        BodyContent::Outsourced => {
            let mut handle = body_store
                .open_request_body(request.request_id)
                .await
                .map_err(|e| TargetError::Failed(e.to_string()))?;
            let mut buf = Vec::with_capacity(request.body_size as usize);
            handle
                .read_to_end(&mut buf)
                .await
                .map_err(|e| TargetError::Failed(e.to_string()))?;
            Ok(Bytes::from(buf))
        }
    }
}

async fn build_response(
    request_id: RequestId,
    origin_id: OriginId,
    outcome: TargetOutcome,
    binary_size_threshold: u64,
    body_store: &Arc<dyn relay_bodystore::BodyStore>,
) -> TargetResponse {
    let body_size = outcome.body.len() as u64;
    let body = if body_size > binary_size_threshold {
        let mut reader = std::io::Cursor::new(outcome.body.to_vec());
        match body_store.store_response_body(request_id, &mut reader).await {
            Ok(_) => BodyContent::Outsourced,
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "failed to outsource response body, inlining instead");
                BodyContent::inline(outcome.body.clone())
            }
        }
    } else {
        BodyContent::inline(outcome.body)
    };

    TargetResponse::success(request_id, origin_id, HttpStatusCode(outcome.status), outcome.headers, body, body_size)
}

fn failed_response(request_id: RequestId, origin_id: OriginId) -> TargetResponse {
    TargetResponse {
        request_id,
        request_origin_id: origin_id,
        status: HttpStatusCode::SERVICE_UNAVAILABLE,
        headers: Headers::new(),
        body: BodyContent::inline(Bytes::new()),
        body_size: 0,
        request_failed: true,
        request_expired: false,
    }
}

fn expired_response(request_id: RequestId, origin_id: OriginId) -> TargetResponse {
    TargetResponse {
        request_id,
        request_origin_id: origin_id,
        status: HttpStatusCode::REQUEST_TIMEOUT,
        headers: Headers::new(),
        body: BodyContent::inline(Bytes::new()),
        body_size: 0,
        request_failed: false,
        request_expired: true,
    }
}

async fn publish_and_ack(broker: &BrokerPublisher, origin_id: OriginId, request_id: RequestId, response: &TargetResponse) {
    if let Err(err) = broker.dispatch_response(origin_id, response).await {
        warn!(request_id = %request_id, error = %err, "failed to publish response");
        return;
    }
    let ack = AcknowledgeRequest {
        request_id,
        origin_id,
        acknowledge_id: AcknowledgeId(uuid::Uuid::new_v4().to_string()),
    };
    if let Err(err) = broker.dispatch_acknowledge(origin_id, &ack).await {
        warn!(request_id = %request_id, error = %err, "failed to publish acknowledge");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl TargetHandler for EchoHandler {
        async fn handle(&self, invocation: TargetInvocation) -> Result<TargetOutcome, TargetError> {
            Ok(TargetOutcome {
                status: 200,
                headers: Headers::new(),
                body: invocation.body,
            })
        }
    }

    #[tokio::test]
    async fn echo_handler_roundtrips_body() {
        let invocation = TargetInvocation {
            method: HttpMethod::new("POST"),
            url: "/echo".to_string(),
            headers: Headers::new(),
            query_string: None,
            body: Bytes::from_static(b"ping"),
        };
        let outcome = EchoHandler.handle(invocation).await.unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, Bytes::from_static(b"ping"));
    }

    #[tokio::test]
    async fn small_response_body_is_inlined() {
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn relay_bodystore::BodyStore> =
            Arc::new(relay_bodystore::FsBodyStore::at_path(tmp.path()).await.unwrap());

        let outcome = TargetOutcome {
            status: 200,
            headers: Headers::new(),
            body: Bytes::from_static(b"small"),
        };
        let response = build_response(RequestId::new(), OriginId::new(), outcome, 1024, &store).await;
        assert!(!response.is_outsourced());
        assert_eq!(response.body.as_inline().unwrap().as_ref(), b"small");
    }

    #[tokio::test]
    async fn oversized_response_body_is_outsourced() {
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn relay_bodystore::BodyStore> =
            Arc::new(relay_bodystore::FsBodyStore::at_path(tmp.path()).await.unwrap());

        let outcome = TargetOutcome {
            status: 200,
            headers: Headers::new(),
            body: Bytes::from(vec![0u8; 64]),
        };
        let request_id = RequestId::new();
        let response = build_response(request_id, OriginId::new(), outcome, 8, &store).await;
        assert!(response.is_outsourced());
        assert_eq!(response.body_size, 64);

        let mut handle = store.open_response_body(request_id).await.unwrap();
        let mut out = Vec::new();
        handle.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 64);
    }

    #[tokio::test]
    async fn inline_request_body_is_used_directly() {
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn relay_bodystore::BodyStore> =
            Arc::new(relay_bodystore::FsBodyStore::at_path(tmp.path()).await.unwrap());

        let request = RelayRequest::builder(relay_proto::TenantId::new("t1"), OriginId::new())
            .body(BodyContent::inline(Bytes::from_static(b"hi")), 2)
            .build();
        let body = resolve_request_body(&request, &store).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"hi"));
    }
}
