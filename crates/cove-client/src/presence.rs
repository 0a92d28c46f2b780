//! Live typing-presence view for one room.
//!
//! Thin by design: the remote presence map already carries the whole
//! contract, so this is a forwarding layer from the remote watch into
//! a tokio `watch` channel plus a passthrough setter.

use std::collections::HashSet;
use std::sync::Arc;

use cove_shared::{RoomId, UserId};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use cove_remote::PresenceStore;

use crate::error::Result;

/// Live set of users currently typing in a room.
pub struct PresenceStream {
    store: Arc<dyn PresenceStore>,
    room: RoomId,
    rx: watch::Receiver<HashSet<UserId>>,
    task: JoinHandle<()>,
}

impl PresenceStream {
    pub async fn open(store: Arc<dyn PresenceStore>, room: RoomId) -> Result<Self> {
        let mut remote_watch = store.watch(&room).await?;
        let (tx, rx) = watch::channel(HashSet::new());

        let task = tokio::spawn(async move {
            while let Some(typing) = remote_watch.recv().await {
                if tx.send(typing).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            store,
            room,
            rx,
            task,
        })
    }

    /// Observe the typing set.
    pub fn subscribe(&self) -> watch::Receiver<HashSet<UserId>> {
        self.rx.clone()
    }

    /// Set or clear this user's typing key. Debounce is the caller's
    /// concern.
    pub async fn set_typing(&self, user: &UserId, is_typing: bool) -> Result<()> {
        self.store.set_typing(&self.room, user, is_typing).await?;
        Ok(())
    }

    /// Detach from the remote presence map.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for PresenceStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
