//! Error mapping for the ingress pipeline.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_proto::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngressError {
    /// No connector available, or publish failed after one re-selection.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The tenant-configured (or request) expiration elapsed before a
    /// response arrived.
    #[error("request expired before a response arrived")]
    Timeout,

    /// The underlying connection broke while we were still reading the
    /// caller's body. Distinct from the (far more common) case where the
    /// whole handler future is simply dropped by the runtime when the
    /// client disconnects — that case never reaches an `IngressError` at
    /// all, since nothing runs after the drop. See [`crate::ingress`] module
    /// docs.
    #[error("client aborted the request")]
    ClientAbort,

    /// Factory/interceptor failure, or any other unexpected error. An outer
    /// framework layer would turn this into 500; here, we do it ourselves
    /// since this server has no further layer above it.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        match self {
            IngressError::Transport(e) => {
                tracing::warn!(error = %e, "dispatch failed, returning 503");
                (StatusCode::SERVICE_UNAVAILABLE, "relay: no connector available").into_response()
            }
            IngressError::Timeout => {
                (StatusCode::REQUEST_TIMEOUT, "relay: request expired").into_response()
            }
            IngressError::ClientAbort => {
                // 499 is nginx's long-standing convention for "client closed
                // the request"; there's no IANA-registered code for it, and
                // by this point there's usually no one left to read it.
                StatusCode::from_u16(499).unwrap().into_response()
            }
            IngressError::Internal(e) => {
                tracing::error!(error = %e, "internal error in ingress pipeline");
                (StatusCode::INTERNAL_SERVER_ERROR, "relay: internal error").into_response()
            }
        }
    }
}
