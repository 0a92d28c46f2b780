//! The remote append log of messages, keyed by room then message id.

use async_trait::async_trait;
use cove_shared::{MessageStatus, RoomId};
use uuid::Uuid;

use crate::error::Result;
use crate::record::MessageRecord;
use crate::subscription::Watch;

/// Live subscription to a room's "last N by timestamp" view. Each
/// delivery is the full, re-sorted window, not a diff.
pub type LogWatch = Watch<Vec<MessageRecord>>;

/// Ordered, keyed, queryable message log reachable over the network.
///
/// Writes are upserts: publishing an id that is already present
/// overwrites the record, which is what makes the outbox pipeline
/// idempotent under retry races.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Upsert one record under its id.
    async fn put(&self, room: &RoomId, record: MessageRecord) -> Result<()>;

    /// Point-write the status field of an existing record.
    async fn set_status(&self, room: &RoomId, id: Uuid, status: MessageStatus) -> Result<()>;

    /// Point-delete. Deleting an absent id is not an error.
    async fn delete(&self, room: &RoomId, id: Uuid) -> Result<()>;

    /// The newest `limit` records, newest first.
    async fn latest(&self, room: &RoomId, limit: usize) -> Result<Vec<MessageRecord>>;

    /// Records strictly older than `before_ts`, newest first, capped
    /// at `limit`. An empty result from a successful query means the
    /// history is exhausted.
    async fn before(&self, room: &RoomId, before_ts: i64, limit: usize)
        -> Result<Vec<MessageRecord>>;

    /// Subscribe to the live "last `limit`" window. The current
    /// snapshot is delivered first, then one snapshot per change.
    async fn watch_latest(&self, room: &RoomId, limit: usize) -> Result<LogWatch>;
}
