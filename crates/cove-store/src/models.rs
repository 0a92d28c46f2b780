//! Structs persisted in the local database.

use cove_shared::{Message, RoomId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One durable send job. Identified by the message id it carries;
/// enqueueing the same id again replaces the row and resets the
/// attempt state, which is exactly what an explicit user retry wants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxJob {
    pub message_id: Uuid,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: String,
    /// Target send time, milliseconds since epoch.
    pub timestamp_ms: i64,
    /// Local paths of attachments still to be staged.
    pub media_paths: Vec<String>,
    /// Mime types, parallel to `media_paths`.
    pub media_types: Vec<String>,
    /// Completed attempts so far.
    pub attempts: u32,
    /// Earliest time the next attempt may run, milliseconds since
    /// epoch. Zero means immediately.
    pub next_attempt_ms: i64,
}

impl OutboxJob {
    /// Build a fresh job from a draft message. Attachments without a
    /// local path (already staged ones) carry their path as absent
    /// and are skipped here; staging only needs the local files.
    pub fn for_message(room: &RoomId, message: &Message) -> Self {
        let mut media_paths = Vec::new();
        let mut media_types = Vec::new();
        for item in &message.media {
            if let Some(path) = &item.local_path {
                media_paths.push(path.clone());
                media_types.push(item.mime_type.clone());
            }
        }

        Self {
            message_id: message.id,
            room_id: room.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            content: message.content.clone(),
            timestamp_ms: message.timestamp_ms,
            media_paths,
            media_types,
            attempts: 0,
            next_attempt_ms: 0,
        }
    }
}
