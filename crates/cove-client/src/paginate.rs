//! Backward pagination over the remote log.

use std::sync::Arc;

use cove_shared::{sort_newest_first, Message, RoomId};
use tracing::debug;

use cove_remote::MessageLog;

use crate::error::Result;

/// Fetches older pages without disturbing the live tail.
pub struct Paginator {
    log: Arc<dyn MessageLog>,
    room: RoomId,
}

impl Paginator {
    pub fn new(log: Arc<dyn MessageLog>, room: RoomId) -> Self {
        Self { log, room }
    }

    /// Messages strictly older than `before_ts`, newest first, at
    /// most `limit` of them.
    ///
    /// Safe to call repeatedly. An `Ok` empty page means the history
    /// is exhausted; transport failures propagate as errors and must
    /// not be read as end-of-history. Pages only ever contain
    /// terminal records, never local placeholders.
    pub async fn load_older(&self, before_ts: i64, limit: usize) -> Result<Vec<Message>> {
        let records = self.log.before(&self.room, before_ts, limit).await?;
        debug!(
            room = %self.room,
            before_ts,
            count = records.len(),
            "loaded older page"
        );

        let mut page: Vec<Message> = records.into_iter().map(|r| r.into_message()).collect();
        sort_newest_first(&mut page);
        Ok(page)
    }
}
