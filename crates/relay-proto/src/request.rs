//! `RelayRequest`: the forwarded HTTP envelope, server → connector.

use crate::body::BodyContent;
use crate::headers::Headers;
use crate::ids::{OriginId, RequestId, TenantId};
use serde::{Deserialize, Serialize};

/// HTTP method, carried as a plain string on the wire (avoids depending on
/// `http::Method`'s serde support, which is feature-gated and incomplete for
/// custom/extension methods).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HttpMethod(String);

impl HttpMethod {
    pub fn new(method: impl Into<String>) -> Self {
        Self(method.into().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A relay request: the envelope carried from ingress, through the
/// coordinator and hub, to the connector's local target invocation.
///
/// Immutable after ingress interceptors have run; every downstream
/// component observes a stable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    pub request_id: RequestId,
    pub request_origin_id: OriginId,
    pub tenant_id: TenantId,
    /// Routing hint for multi-target tenants; opaque beyond equality.
    pub target: Option<String>,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub query_string: Option<String>,
    pub body: BodyContent,
    /// Authoritative byte count; must equal the bytes `body` actually
    /// produces once resolved (inline len, or BodyStore entry size).
    pub body_size: u64,
    /// May be forced true by tenant config (logical OR), never forced false.
    pub enable_tracing: bool,
    /// Monotonic deadline, if the tenant/request configured one.
    pub expiration_ms: Option<u64>,
}

impl RelayRequest {
    pub fn builder(tenant_id: TenantId, origin_id: OriginId) -> RelayRequestBuilder {
        RelayRequestBuilder {
            request_id: RequestId::new(),
            request_origin_id: origin_id,
            tenant_id,
            target: None,
            method: HttpMethod::new("GET"),
            url: String::new(),
            headers: Headers::new(),
            query_string: None,
            body: BodyContent::Outsourced,
            body_size: 0,
            enable_tracing: false,
            expiration_ms: None,
        }
    }
}

/// Plain constructor wiring for a `RelayRequest`, rather than a DI-resolved
/// factory interface.
pub struct RelayRequestBuilder {
    request_id: RequestId,
    request_origin_id: OriginId,
    tenant_id: TenantId,
    target: Option<String>,
    method: HttpMethod,
    url: String,
    headers: Headers,
    query_string: Option<String>,
    body: BodyContent,
    body_size: u64,
    enable_tracing: bool,
    expiration_ms: Option<u64>,
}

impl RelayRequestBuilder {
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn query_string(mut self, query: Option<String>) -> Self {
        self.query_string = query;
        self
    }

    pub fn body(mut self, body: BodyContent, body_size: u64) -> Self {
        self.body = body;
        self.body_size = body_size;
        self
    }

    pub fn enable_tracing(mut self, enable: bool) -> Self {
        self.enable_tracing = enable;
        self
    }

    pub fn expiration_ms(mut self, expiration_ms: Option<u64>) -> Self {
        self.expiration_ms = expiration_ms;
        self
    }

    pub fn build(self) -> RelayRequest {
        RelayRequest {
            request_id: self.request_id,
            request_origin_id: self.request_origin_id,
            tenant_id: self.tenant_id,
            target: self.target,
            method: self.method,
            url: self.url,
            headers: self.headers,
            query_string: self.query_string,
            body: self.body,
            body_size: self.body_size,
            enable_tracing: self.enable_tracing,
            expiration_ms: self.expiration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_fresh_request_ids() {
        let a = RelayRequest::builder(TenantId::new("t1"), OriginId::new()).build();
        let b = RelayRequest::builder(TenantId::new("t1"), OriginId::new()).build();
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn method_is_uppercased() {
        assert_eq!(HttpMethod::new("get").as_str(), "GET");
    }
}
