//! Live, capped-size message view for one room.
//!
//! One remote subscription feeds any number of observers: the stream
//! holds a tokio `watch` channel whose value is always the full,
//! freshly merged and sorted window. Local SENDING/FAILED
//! placeholders ride on top of the remote set until the confirmed
//! copy arrives under the same id and supersedes them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cove_shared::{Message, MessageStatus, RoomId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use cove_remote::{MessageLog, MessageRecord};

use crate::error::Result;
use crate::merge::merge_overlay;

#[derive(Default)]
struct Overlay {
    remote: HashMap<Uuid, Message>,
    local: HashMap<Uuid, Message>,
}

struct StreamShared {
    state: Mutex<Overlay>,
    tx: watch::Sender<Vec<Message>>,
}

impl StreamShared {
    fn emit_locked(&self, overlay: &Overlay) {
        self.tx
            .send_replace(merge_overlay(&overlay.remote, &overlay.local));
    }

    /// Replace the confirmed working set wholesale and drop overlay
    /// entries the remote copy now supersedes.
    fn apply_remote(&self, records: Vec<MessageRecord>) {
        let remote: HashMap<Uuid, Message> = records
            .into_iter()
            .map(|r| {
                let m = r.into_message();
                (m.id, m)
            })
            .collect();

        let mut overlay = self.state.lock().expect("stream lock");
        overlay.local.retain(|id, _| !remote.contains_key(id));
        overlay.remote = remote;
        self.emit_locked(&overlay);
    }
}

/// Live sequence of the newest messages in a room, newest first.
pub struct MessageStream {
    shared: Arc<StreamShared>,
    task: JoinHandle<()>,
}

impl MessageStream {
    /// Subscribe to the room's live window. The first emission arrives
    /// once the remote snapshot does.
    pub async fn open(log: Arc<dyn MessageLog>, room: RoomId, limit: usize) -> Result<Self> {
        let mut remote_watch = log.watch_latest(&room, limit).await?;
        let (tx, _rx) = watch::channel(Vec::new());
        let shared = Arc::new(StreamShared {
            state: Mutex::new(Overlay::default()),
            tx,
        });

        let task_shared = shared.clone();
        let task = tokio::spawn(async move {
            while let Some(records) = remote_watch.recv().await {
                task_shared.apply_remote(records);
            }
            debug!(room = %room, "message stream detached from remote");
        });

        Ok(Self { shared, task })
    }

    /// Observe the merged window. Multiple subscribers share the one
    /// underlying remote subscription.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.shared.tx.subscribe()
    }

    /// The current merged window.
    pub fn snapshot(&self) -> Vec<Message> {
        self.shared.tx.borrow().clone()
    }

    /// Insert (or replace) a local placeholder and re-emit.
    pub fn insert_local(&self, message: Message) {
        let mut overlay = self.shared.state.lock().expect("stream lock");
        overlay.local.insert(message.id, message);
        self.shared.emit_locked(&overlay);
    }

    /// Flip a local placeholder to FAILED. No-op when the id is not
    /// in the overlay (e.g. the remote copy already superseded it).
    pub fn mark_failed(&self, id: Uuid) {
        let mut overlay = self.shared.state.lock().expect("stream lock");
        if let Some(message) = overlay.local.get_mut(&id) {
            message.status = MessageStatus::Failed;
            self.shared.emit_locked(&overlay);
        }
    }

    /// Remove a local placeholder and re-emit.
    pub fn remove_local(&self, id: Uuid) {
        let mut overlay = self.shared.state.lock().expect("stream lock");
        if overlay.local.remove(&id).is_some() {
            self.shared.emit_locked(&overlay);
        }
    }

    /// A copy of the overlay entry for `id`, if one is held.
    pub fn local_message(&self, id: Uuid) -> Option<Message> {
        let overlay = self.shared.state.lock().expect("stream lock");
        overlay.local.get(&id).cloned()
    }

    /// Detach from the remote log. No further emissions occur; one
    /// delivery already in flight may still have landed.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
