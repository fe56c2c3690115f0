//! Rewindable request body buffering: spool to memory up to a configurable
//! bound, then spill to a scratch file on disk.
//!
//! This is deliberately a different threshold from the inline/outsourced
//! split `TryInlineBodyContent` applies at dispatch time — this one only
//! exists so interceptors and the size decision see a complete payload
//! without the server ever holding an unbounded body in RAM.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use relay_proto::RequestId;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::ingress::error::IngressError;

/// Owns a scratch file path and removes it on drop, the same detached-spawn
/// pattern `relay_bodystore::BodyHandle` uses — `Drop` can't await, so
/// deletion runs as a best-effort background task.
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let path = std::mem::take(&mut self.0);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(?err, path = %path.display(), "failed to remove leftover scratch file");
                    }
                }
            });
        }
    }
}

/// A fully drained request body: either still in memory, or spilled to a
/// scratch file because it exceeded the spool bound. The scratch file is
/// removed once this value (and its `ScratchFile` guard) drops, whether or
/// not anyone read it first — e.g. a client-request interceptor supplies its
/// own inline body and the drained buffer goes unread.
pub enum SpooledBody {
    Memory(Bytes),
    Spilled { file: ScratchFile, size: u64 },
}

impl SpooledBody {
    pub fn size(&self) -> u64 {
        match self {
            SpooledBody::Memory(bytes) => bytes.len() as u64,
            SpooledBody::Spilled { size, .. } => *size,
        }
    }

    /// Read the whole body into memory, regardless of how it's currently
    /// held. Only called once we already know the body is small enough to
    /// inline (the dispatch-time size check runs first).
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            SpooledBody::Memory(bytes) => Ok(bytes),
            SpooledBody::Spilled { file, .. } => {
                let data = tokio::fs::read(file.path()).await?;
                Ok(Bytes::from(data))
            }
        }
    }

    /// Stage the body straight into a `BodyStore` entry without buffering it
    /// whole in memory, consuming `self`. Used by the dispatch-time
    /// outsourcing decision once a body is known to exceed `maxInline`.
    pub async fn store_into(
        self,
        store: &dyn relay_bodystore::BodyStore,
        request_id: RequestId,
    ) -> Result<u64, relay_bodystore::BodyStoreError> {
        match self {
            SpooledBody::Memory(bytes) => {
                let mut cursor = std::io::Cursor::new(bytes.to_vec());
                store.store_request_body(request_id, &mut cursor).await
            }
            SpooledBody::Spilled { file, .. } => {
                let mut source = tokio::fs::File::open(file.path()).await?;
                store.store_request_body(request_id, &mut source).await
            }
        }
    }
}

/// Drain an axum request body, spooling to `scratch_dir` once `spool_bound`
/// bytes have accumulated in memory. The scratch filename is just a fresh
/// random id; it has no relation to the eventual `RequestId` or to BodyStore
/// staging, which happens later (and only for bodies that also exceed the
/// tenant's inline threshold).
pub async fn drain_rewindable(
    body: axum::body::Body,
    spool_bound: u64,
    scratch_dir: &Path,
) -> Result<SpooledBody, IngressError> {
    let mut stream = body.into_data_stream();
    let mut memory = BytesMut::new();
    let mut spill: Option<(tokio::fs::File, PathBuf, u64)> = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|_| IngressError::ClientAbort)?;

        if let Some((file, _path, size)) = spill.as_mut() {
            file.write_all(&chunk)
                .await
                .map_err(|e| IngressError::Internal(e.into()))?;
            *size += chunk.len() as u64;
            continue;
        }

        memory.extend_from_slice(&chunk);
        if memory.len() as u64 > spool_bound {
            tokio::fs::create_dir_all(scratch_dir)
                .await
                .map_err(|e| IngressError::Internal(e.into()))?;
            let path = scratch_dir.join(format!("{}.inflight", RequestId::new()));
            let mut file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| IngressError::Internal(e.into()))?;
            let already = std::mem::take(&mut memory);
            file.write_all(&already)
                .await
                .map_err(|e| IngressError::Internal(e.into()))?;
            let size = already.len() as u64;
            spill = Some((file, path, size));
        }
    }

    match spill {
        Some((_file, path, size)) => Ok(SpooledBody::Spilled {
            file: ScratchFile(path),
            size,
        }),
        None => Ok(SpooledBody::Memory(memory.freeze())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn small_body_stays_in_memory() {
        let body = axum::body::Body::from("hello world");
        let tmp = tempfile::tempdir().unwrap();
        let spooled = drain_rewindable(body, 1024, tmp.path()).await.unwrap();
        assert!(matches!(spooled, SpooledBody::Memory(_)));
        assert_eq!(spooled.size(), 11);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oversized_body_spills_to_disk() {
        let payload = vec![7u8; 4096];
        let body = axum::body::Body::from(payload.clone());
        let tmp = tempfile::tempdir().unwrap();
        let spooled = drain_rewindable(body, 1024, tmp.path()).await.unwrap();
        assert!(matches!(spooled, SpooledBody::Spilled { .. }));
        assert_eq!(spooled.size(), 4096);
        let bytes = spooled.into_bytes().await.unwrap();
        assert_eq!(bytes.as_ref(), payload.as_slice());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spilled_body_stores_directly_into_bodystore() {
        let payload = vec![9u8; 4096];
        let body = axum::body::Body::from(payload.clone());
        let scratch = tempfile::tempdir().unwrap();
        let spooled = drain_rewindable(body, 1024, scratch.path()).await.unwrap();

        let store_dir = tempfile::tempdir().unwrap();
        let store = relay_bodystore::FsBodyStore::at_path(store_dir.path()).await.unwrap();
        let request_id = RequestId::new();
        let written = spooled.store_into(&store, request_id).await.unwrap();
        assert_eq!(written, 4096);
    }
}
