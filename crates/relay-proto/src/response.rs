//! `TargetResponse`: the forwarded HTTP envelope, connector → server.

use crate::body::BodyContent;
use crate::headers::Headers;
use crate::ids::{OriginId, RequestId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HttpStatusCode(pub u16);

impl HttpStatusCode {
    pub const OK: HttpStatusCode = HttpStatusCode(200);
    pub const SERVICE_UNAVAILABLE: HttpStatusCode = HttpStatusCode(503);
    pub const REQUEST_TIMEOUT: HttpStatusCode = HttpStatusCode(408);
}

/// A target response: same correlation ids as the request it answers, plus
/// the outcome flags and inline/outsourced body split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetResponse {
    pub request_id: RequestId,
    pub request_origin_id: OriginId,
    pub status: HttpStatusCode,
    pub headers: Headers,
    pub body: BodyContent,
    pub body_size: u64,
    /// Mutually exclusive with `request_expired`.
    pub request_failed: bool,
    pub request_expired: bool,
}

impl TargetResponse {
    pub fn success(
        request_id: RequestId,
        request_origin_id: OriginId,
        status: HttpStatusCode,
        headers: Headers,
        body: BodyContent,
        body_size: u64,
    ) -> Self {
        Self {
            request_id,
            request_origin_id,
            status,
            headers,
            body,
            body_size,
            request_failed: false,
            request_expired: false,
        }
    }

    pub fn is_outsourced(&self) -> bool {
        self.body_size > 0 && self.body.is_outsourced()
    }
}
