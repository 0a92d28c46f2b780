//! The remote blob store for staged media payloads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// One staged media payload. The body is base64 so the record can
/// live in a JSON-shaped keyed store alongside the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRecord {
    pub id: Uuid,
    /// Base64-encoded payload bytes.
    pub data: String,
    pub mime_type: String,
    /// Upload time, milliseconds since epoch.
    pub timestamp: i64,
}

/// Keyed point get/put/delete over media payloads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store one record atomically under its id.
    async fn put(&self, record: BlobRecord) -> Result<()>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<BlobRecord>;

    /// Delete a record. Deleting an absent id is not an error.
    async fn delete(&self, id: Uuid) -> Result<()>;
}
