//! Core domain model: rooms, users, messages and their attachments.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be
//! handed directly to a UI layer or embedded in a remote record.

use std::cmp::Ordering;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A logical chat channel. Every log partition, presence map and live
/// subscription is keyed by room; there is no implicit global room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable per-device user identity. Opaque; assigned outside the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// The current-user record persisted in local durable state.
/// Exactly one exists per device; saving replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Display name, 2-20 characters after trimming.
    pub name: String,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Delivery status of a message.
///
/// `Sending` and `Failed` are client-local overlay metadata; the
/// remote log only ever holds terminal `Sent` records as
/// authoritative state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sending,
    Sent,
    Failed,
}

/// A single chat message.
///
/// The id is assigned client-side at creation and never changes; a
/// retry reuses the id (with a fresh timestamp) so the remote copy
/// naturally supersedes the local placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: UserId,
    /// Denormalized at send time; never re-resolved.
    pub sender_name: String,
    /// May be empty only when `media` is non-empty.
    pub content: String,
    pub media: Vec<MediaItem>,
    /// Milliseconds since epoch. The sort and pagination key.
    pub timestamp_ms: i64,
    pub status: MessageStatus,
}

impl Message {
    /// Build a fresh draft message in `Sending` state with a new id
    /// and the current wall-clock timestamp.
    pub fn draft(
        sender: &User,
        content: impl Into<String>,
        media: Vec<MediaItem>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            content: content.into(),
            media,
            timestamp_ms: now_ms(),
            status: MessageStatus::Sending,
        }
    }
}

/// Current wall-clock time in milliseconds since epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Display ordering: newest first by `timestamp_ms`, ties broken by
/// id in lexical (uuid string) order so that equal-timestamp messages
/// sort deterministically on every client.
pub fn display_order(a: &Message, b: &Message) -> Ordering {
    b.timestamp_ms
        .cmp(&a.timestamp_ms)
        .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
}

/// Sort a message list into display order (newest first).
pub fn sort_newest_first(messages: &mut [Message]) {
    messages.sort_by(display_order);
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

/// Upload state of a single attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

/// A media attachment. Exactly one of `local_path` / `remote_ref` is
/// set: the local path exists only before upload, the remote ref (a
/// content id resolvable through the media stager) only after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: Uuid,
    pub local_path: Option<String>,
    pub remote_ref: Option<Uuid>,
    pub mime_type: String,
    pub upload_status: UploadStatus,
}

impl MediaItem {
    /// A not-yet-uploaded attachment referencing a local file.
    pub fn local(path: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            local_path: Some(path.into()),
            remote_ref: None,
            mime_type: mime_type.into(),
            upload_status: UploadStatus::Pending,
        }
    }

    /// A staged attachment known only by its remote content id.
    pub fn uploaded(id: Uuid, remote_ref: Uuid, mime_type: impl Into<String>) -> Self {
        Self {
            id,
            local_path: None,
            remote_ref: Some(remote_ref),
            mime_type: mime_type.into(),
            upload_status: UploadStatus::Uploaded,
        }
    }
}
