//! Wire record shapes for the remote message log.
//!
//! Records are fully denormalized: the log stores one self-contained
//! JSON-shaped record per message, keyed by room then message id and
//! orderable by `timestamp`.

use cove_shared::{MediaItem, Message, MessageStatus, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A published media attachment: content id plus mime type. Local
/// paths never reach the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub id: Uuid,
    /// Content id resolvable through the blob store.
    pub media_id: Uuid,
    pub mime_type: String,
}

/// One message as stored in the remote log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Uuid,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_items: Vec<MediaRecord>,
    /// Milliseconds since epoch; the log's order key.
    pub timestamp: i64,
    pub status: MessageStatus,
}

impl MessageRecord {
    /// Build the publishable record for a message. Only uploaded
    /// attachments (those holding a remote ref) are carried; the
    /// status is whatever the caller set on the message.
    pub fn from_message(message: &Message) -> Self {
        let media_items = message
            .media
            .iter()
            .filter_map(|m| {
                m.remote_ref.map(|media_id| MediaRecord {
                    id: m.id,
                    media_id,
                    mime_type: m.mime_type.clone(),
                })
            })
            .collect();

        Self {
            id: message.id,
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            content: message.content.clone(),
            media_items,
            timestamp: message.timestamp_ms,
            status: message.status,
        }
    }

    /// Convert a fetched record back into the domain model. Remote
    /// attachments are uploaded by definition.
    pub fn into_message(self) -> Message {
        let media = self
            .media_items
            .into_iter()
            .map(|m| MediaItem::uploaded(m.id, m.media_id, m.mime_type))
            .collect();

        Message {
            id: self.id,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            content: self.content,
            media,
            timestamp_ms: self.timestamp,
            status: self.status,
        }
    }
}
