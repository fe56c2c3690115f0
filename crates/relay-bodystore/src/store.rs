//! Filesystem-backed BodyStore.
//!
//! Layout, sharded the same way a content-addressed store shards digests,
//! but keyed by `RequestId` instead of a content digest: there's exactly one
//! reader per entry here, so there's no dedup to gain from hashing.
//!
//! ```text
//! {base_path}/
//! ├── requests/
//! │   └── ab/
//! │       └── cde123...  # request body, named by the rest of the uuid
//! └── responses/
//!     └── ab/
//!         └── cde123...
//! ```

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use relay_proto::RequestId;
use tokio::fs;
use tokio::io::AsyncRead;

use crate::config::BodyStoreConfig;
use crate::{BodyHandle, BodyStoreError};

/// Minimal store/open contract for request and response bodies.
///
/// `store_*` writes a stream to disk and reports the byte count;
/// `open_*` returns a readable handle that deletes the entry on drop.
#[async_trait]
pub trait BodyStore: Send + Sync {
    async fn store_request_body(
        &self,
        id: RequestId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, BodyStoreError>;

    async fn open_request_body(&self, id: RequestId) -> Result<BodyHandle, BodyStoreError>;

    async fn store_response_body(
        &self,
        id: RequestId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, BodyStoreError>;

    async fn open_response_body(&self, id: RequestId) -> Result<BodyHandle, BodyStoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Request,
    Response,
}

/// First two hex chars as the shard directory, the rest as the filename —
/// keeps any one directory from growing unbounded under sustained traffic.
fn shard(id: RequestId) -> (String, String) {
    let hex = id.as_uuid().simple().to_string();
    (hex[0..2].to_string(), hex[2..].to_string())
}

/// A BodyStore backed by plain files on a local (or NFS-mounted) filesystem.
#[derive(Debug, Clone)]
pub struct FsBodyStore {
    config: BodyStoreConfig,
}

impl FsBodyStore {
    /// Create a store rooted at `config.base_path`, creating the
    /// `requests`/`responses` directories if missing.
    pub async fn new(config: BodyStoreConfig) -> Result<Self, BodyStoreError> {
        fs::create_dir_all(config.requests_dir()).await?;
        fs::create_dir_all(config.responses_dir()).await?;
        Ok(Self { config })
    }

    pub async fn at_path(path: impl Into<PathBuf>) -> Result<Self, BodyStoreError> {
        Self::new(BodyStoreConfig::with_base_path(path)).await
    }

    pub fn config(&self) -> &BodyStoreConfig {
        &self.config
    }

    fn path_for(&self, kind: BodyKind, id: RequestId) -> PathBuf {
        let (prefix, remainder) = shard(id);
        let base = match kind {
            BodyKind::Request => self.config.requests_dir(),
            BodyKind::Response => self.config.responses_dir(),
        };
        base.join(prefix).join(remainder)
    }

    async fn store_body(
        &self,
        kind: BodyKind,
        id: RequestId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, BodyStoreError> {
        let path = self.path_for(kind, id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&path).await?;
        let bytes_written = tokio::io::copy(reader, &mut file).await?;
        Ok(bytes_written)
    }

    async fn open_body(&self, kind: BodyKind, id: RequestId) -> Result<BodyHandle, BodyStoreError> {
        let path = self.path_for(kind, id);
        let file = fs::File::open(&path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                BodyStoreError::NotFound { id }
            } else {
                BodyStoreError::Io(err)
            }
        })?;
        Ok(BodyHandle::new(file, path))
    }
}

#[async_trait]
impl BodyStore for FsBodyStore {
    async fn store_request_body(
        &self,
        id: RequestId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, BodyStoreError> {
        self.store_body(BodyKind::Request, id, reader).await
    }

    async fn open_request_body(&self, id: RequestId) -> Result<BodyHandle, BodyStoreError> {
        self.open_body(BodyKind::Request, id).await
    }

    async fn store_response_body(
        &self,
        id: RequestId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, BodyStoreError> {
        self.store_body(BodyKind::Response, id, reader).await
    }

    async fn open_response_body(&self, id: RequestId) -> Result<BodyHandle, BodyStoreError> {
        self.open_body(BodyKind::Response, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_splits_prefix_and_remainder() {
        let id = RequestId::new();
        let (prefix, remainder) = shard(id);
        assert_eq!(prefix.len(), 2);
        assert_eq!(remainder.len(), 30);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn request_and_response_bodies_are_independent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsBodyStore::at_path(tmp.path()).await.unwrap();
        let id = RequestId::new();

        let mut req = std::io::Cursor::new(b"request side".to_vec());
        store.store_request_body(id, &mut req).await.unwrap();

        // No response body stored yet for the same id.
        let err = store.open_response_body(id).await.unwrap_err();
        assert!(matches!(err, BodyStoreError::NotFound { .. }));

        let handle = store.open_request_body(id).await.unwrap();
        assert!(handle.path().exists());
    }
}
