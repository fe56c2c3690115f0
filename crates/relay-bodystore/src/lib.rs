//! Content staging for oversized relay request/response bodies, addressed by
//! `RequestId` rather than content hash — the BodyStore doesn't need
//! deduplication, it needs a handle that outlives one request's lifecycle and
//! is gone by the time that lifecycle ends.
//!
//! Minimal contract (store, open, release): `store_request_body` /
//! `store_response_body` write a stream to disk and return the byte count;
//! `open_request_body` / `open_response_body` return a readable
//! [`BodyHandle`] whose `Drop` removes the backing file. There is exactly one
//! reader per entry in this system, so "last reader deletes" collapses to
//! "the reader deletes".

pub mod config;
pub mod store;

pub use config::BodyStoreConfig;
pub use store::{BodyStore, FsBodyStore};

use relay_proto::RequestId;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::io::{AsyncRead, ReadBuf};

#[derive(Debug, Error)]
pub enum BodyStoreError {
    #[error("body for request {id} not found")]
    NotFound { id: RequestId },

    #[error("body store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An open, readable body staged under a `RequestId`.
///
/// Removes its backing file on drop. The removal itself happens on the
/// current Tokio runtime as a detached task, since `Drop` cannot await; if no
/// runtime is current (e.g. the handle outlives the process's async context)
/// the file is simply left behind.
pub struct BodyHandle {
    file: tokio::fs::File,
    path: PathBuf,
}

impl BodyHandle {
    pub(crate) fn new(file: tokio::fs::File, path: PathBuf) -> Self {
        Self { file, path }
    }

    /// The backing path, for diagnostics only — not stable across restarts.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl AsyncRead for BodyHandle {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl Drop for BodyHandle {
    fn drop(&mut self) {
        let path = std::mem::take(&mut self.path);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(?err, path = %path.display(), "failed to remove body store entry");
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test(flavor = "multi_thread")]
    async fn store_then_open_roundtrips_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBodyStore::at_path(tmp.path()).await.unwrap();
        let id = RequestId::new();

        let mut src = std::io::Cursor::new(b"hello relay".to_vec());
        let written = store.store_request_body(id, &mut src).await.unwrap();
        assert_eq!(written, 11);

        let mut handle = store.open_request_body(id).await.unwrap();
        let mut out = Vec::new();
        handle.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello relay");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_missing_request_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBodyStore::at_path(tmp.path()).await.unwrap();
        let err = store.open_request_body(RequestId::new()).await.unwrap_err();
        assert!(matches!(err, BodyStoreError::NotFound { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropping_handle_removes_backing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBodyStore::at_path(tmp.path()).await.unwrap();
        let id = RequestId::new();

        let mut src = std::io::Cursor::new(b"gone soon".to_vec());
        store.store_response_body(id, &mut src).await.unwrap();

        let handle = store.open_response_body(id).await.unwrap();
        let path = handle.path().to_path_buf();
        assert!(path.exists());

        drop(handle);
        // Deletion runs as a detached task; give it a turn to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!path.exists());
    }
}
