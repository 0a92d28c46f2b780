//! Stage local media into the remote blob store.

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cove_remote::{BlobRecord, BlobStore};
use cove_shared::constants::MAX_MEDIA_BYTES;
use cove_shared::now_ms;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// Uploads size-bounded media payloads and resolves content ids.
#[derive(Clone)]
pub struct MediaStager {
    blobs: Arc<dyn BlobStore>,
}

impl MediaStager {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Read a local file, bound it to [`MAX_MEDIA_BYTES`], upload it
    /// as one atomic record and return the fresh content id.
    ///
    /// The size bound is a hard truncation, not a re-encode: an
    /// oversized image comes out byte-clipped and may no longer
    /// decode. Callers must tolerate corrupt media on that path; the
    /// bound itself never fails.
    pub async fn stage(&self, path: &Path, mime_type: &str) -> Result<Uuid> {
        let bytes = tokio::fs::read(path).await?;
        let bytes = bound_payload(bytes);

        let id = Uuid::new_v4();
        let record = BlobRecord {
            id,
            data: BASE64.encode(&bytes),
            mime_type: mime_type.to_string(),
            timestamp: now_ms(),
        };

        self.blobs.put(record).await?;
        debug!(media_id = %id, size = bytes.len(), mime = mime_type, "staged media");
        Ok(id)
    }

    /// Fetch the payload bytes behind a content id.
    pub async fn fetch(&self, media_ref: Uuid) -> Result<Vec<u8>> {
        let record = self.blobs.get(media_ref).await?;
        Ok(BASE64.decode(record.data.as_bytes())?)
    }

    /// Delete the stored record behind a content id.
    pub async fn release(&self, media_ref: Uuid) -> Result<()> {
        self.blobs.delete(media_ref).await?;
        debug!(media_id = %media_ref, "released media");
        Ok(())
    }
}

/// Clamp a payload to the store's size ceiling by truncation.
fn bound_payload(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.len() > MAX_MEDIA_BYTES {
        warn!(
            original = bytes.len(),
            bound = MAX_MEDIA_BYTES,
            "media over size ceiling, truncating; payload may not decode"
        );
        bytes.truncate(MAX_MEDIA_BYTES);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cove_remote::{MemoryRemote, RemoteError};
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn stager() -> (MediaStager, Arc<MemoryRemote>) {
        let remote = Arc::new(MemoryRemote::new());
        (MediaStager::new(remote.clone()), remote)
    }

    fn temp_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[tokio::test]
    async fn stage_and_fetch_round_trip() {
        let (stager, _remote) = stager();
        let file = temp_file(b"tiny image bytes");

        let id = stager.stage(file.path(), "image/png").await.unwrap();
        let back = stager.fetch(id).await.unwrap();
        assert_eq!(back, b"tiny image bytes");
    }

    #[tokio::test]
    async fn oversized_payload_is_truncated_not_rejected() {
        let (stager, _remote) = stager();
        let big = vec![0xABu8; MAX_MEDIA_BYTES + 4096];
        let file = temp_file(&big);

        let id = stager.stage(file.path(), "image/jpeg").await.unwrap();
        let back = stager.fetch(id).await.unwrap();
        assert_eq!(back.len(), MAX_MEDIA_BYTES);
        assert_eq!(&back[..], &big[..MAX_MEDIA_BYTES]);
    }

    #[tokio::test]
    async fn release_deletes_the_record() {
        let (stager, _remote) = stager();
        let file = temp_file(b"x");

        let id = stager.stage(file.path(), "image/png").await.unwrap();
        stager.release(id).await.unwrap();

        let err = stager.fetch(id).await.unwrap_err();
        assert!(matches!(err, crate::StagingError::Remote(RemoteError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_local_file_is_not_retryable() {
        let (stager, _remote) = stager();
        let err = stager
            .stage(Path::new("/nonexistent/cove-media-test"), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::StagingError::Read(_)));
        assert!(!err.is_retryable());
    }

    /// Blob store that fails every put with a transient error.
    struct DownBlobStore(AtomicU32);

    #[async_trait]
    impl BlobStore for DownBlobStore {
        async fn put(&self, _record: BlobRecord) -> cove_remote::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Unavailable("blob store down".into()))
        }

        async fn get(&self, id: Uuid) -> cove_remote::Result<BlobRecord> {
            Err(RemoteError::NotFound(id))
        }

        async fn delete(&self, _id: Uuid) -> cove_remote::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn transient_store_failure_is_retryable() {
        let stager = MediaStager::new(Arc::new(DownBlobStore(AtomicU32::new(0))));
        let file = temp_file(b"y");

        let err = stager.stage(file.path(), "image/png").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
