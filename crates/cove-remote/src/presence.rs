//! Ephemeral typing-presence store, keyed by room then user.

use std::collections::HashSet;

use async_trait::async_trait;
use cove_shared::{RoomId, UserId};

use crate::error::Result;
use crate::subscription::Watch;

/// Live subscription to the set of users currently typing in a room.
/// Each delivery is the full current set.
pub type PresenceWatch = Watch<HashSet<UserId>>;

/// Short-lived presence keys: setting typing writes the user's key,
/// clearing it deletes the key. No debounce or timeout is applied
/// here; callers own that policy.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn set_typing(&self, room: &RoomId, user: &UserId, is_typing: bool) -> Result<()>;

    /// Subscribe to all presence keys under a room. The current set
    /// is delivered first, then one set per change.
    async fn watch(&self, room: &RoomId) -> Result<PresenceWatch>;
}
