//! In-process backend implementing all three remote capabilities.
//!
//! Used by tests and local runs. Live subscriptions are real: every
//! mutation fans a change signal out to per-room broadcast channels,
//! and a forwarding task per watch recomputes and delivers the full
//! snapshot, so subscribers exercise the same push path a network
//! backend would drive.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use cove_shared::{MessageStatus, RoomId, UserId};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::blob::{BlobRecord, BlobStore};
use crate::error::{RemoteError, Result};
use crate::log::{LogWatch, MessageLog};
use crate::presence::{PresenceStore, PresenceWatch};
use crate::record::MessageRecord;
use crate::subscription::Watch;

const SIGNAL_CAPACITY: usize = 32;
const WATCH_CAPACITY: usize = 8;

#[derive(Default)]
struct Inner {
    rooms: RwLock<HashMap<RoomId, HashMap<Uuid, MessageRecord>>>,
    blobs: RwLock<HashMap<Uuid, BlobRecord>>,
    typing: RwLock<HashMap<RoomId, HashSet<UserId>>>,
    log_signals: Mutex<HashMap<RoomId, broadcast::Sender<()>>>,
    presence_signals: Mutex<HashMap<RoomId, broadcast::Sender<()>>>,
}

impl Inner {
    fn log_signal(&self, room: &RoomId) -> broadcast::Sender<()> {
        let mut signals = self.log_signals.lock().expect("signal lock");
        signals
            .entry(room.clone())
            .or_insert_with(|| broadcast::channel(SIGNAL_CAPACITY).0)
            .clone()
    }

    fn presence_signal(&self, room: &RoomId) -> broadcast::Sender<()> {
        let mut signals = self.presence_signals.lock().expect("signal lock");
        signals
            .entry(room.clone())
            .or_insert_with(|| broadcast::channel(SIGNAL_CAPACITY).0)
            .clone()
    }

    fn latest_snapshot(&self, room: &RoomId, limit: usize) -> Vec<MessageRecord> {
        let rooms = self.rooms.read().expect("rooms lock");
        let mut records: Vec<MessageRecord> = rooms
            .get(room)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        sort_records(&mut records);
        records.truncate(limit);
        records
    }

    fn typing_snapshot(&self, room: &RoomId) -> HashSet<UserId> {
        let typing = self.typing.read().expect("typing lock");
        typing.get(room).cloned().unwrap_or_default()
    }
}

/// Sort newest first; equal timestamps fall back to id lexical order
/// so snapshots are deterministic.
fn sort_records(records: &mut [MessageRecord]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
    });
}

/// In-memory remote store. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageLog for MemoryRemote {
    async fn put(&self, room: &RoomId, record: MessageRecord) -> Result<()> {
        {
            let mut rooms = self.inner.rooms.write().expect("rooms lock");
            rooms
                .entry(room.clone())
                .or_default()
                .insert(record.id, record);
        }
        let _ = self.inner.log_signal(room).send(());
        Ok(())
    }

    async fn set_status(&self, room: &RoomId, id: Uuid, status: MessageStatus) -> Result<()> {
        {
            let mut rooms = self.inner.rooms.write().expect("rooms lock");
            let record = rooms
                .get_mut(room)
                .and_then(|m| m.get_mut(&id))
                .ok_or(RemoteError::NotFound(id))?;
            record.status = status;
        }
        let _ = self.inner.log_signal(room).send(());
        Ok(())
    }

    async fn delete(&self, room: &RoomId, id: Uuid) -> Result<()> {
        let removed = {
            let mut rooms = self.inner.rooms.write().expect("rooms lock");
            rooms.get_mut(room).map_or(false, |m| m.remove(&id).is_some())
        };
        if removed {
            let _ = self.inner.log_signal(room).send(());
        }
        Ok(())
    }

    async fn latest(&self, room: &RoomId, limit: usize) -> Result<Vec<MessageRecord>> {
        Ok(self.inner.latest_snapshot(room, limit))
    }

    async fn before(
        &self,
        room: &RoomId,
        before_ts: i64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let mut records: Vec<MessageRecord> = {
            let rooms = self.inner.rooms.read().expect("rooms lock");
            rooms
                .get(room)
                .map(|m| {
                    m.values()
                        .filter(|r| r.timestamp < before_ts)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };
        sort_records(&mut records);
        records.truncate(limit);
        Ok(records)
    }

    async fn watch_latest(&self, room: &RoomId, limit: usize) -> Result<LogWatch> {
        let mut signal = self.inner.log_signal(room).subscribe();
        let (tx, watch) = Watch::channel(WATCH_CAPACITY);
        let inner = self.inner.clone();
        let room = room.clone();

        tokio::spawn(async move {
            loop {
                let snapshot = inner.latest_snapshot(&room, limit);
                if !tx.send(snapshot).await {
                    break;
                }
                match signal.recv().await {
                    Ok(()) => {}
                    // Missed signals coalesce into the next snapshot.
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(room = %room, "log watch task finished");
        });

        Ok(watch)
    }
}

#[async_trait]
impl BlobStore for MemoryRemote {
    async fn put(&self, record: BlobRecord) -> Result<()> {
        let mut blobs = self.inner.blobs.write().expect("blobs lock");
        debug!(id = %record.id, size = record.data.len(), "stored blob");
        blobs.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<BlobRecord> {
        let blobs = self.inner.blobs.read().expect("blobs lock");
        blobs.get(&id).cloned().ok_or(RemoteError::NotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut blobs = self.inner.blobs.write().expect("blobs lock");
        blobs.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl PresenceStore for MemoryRemote {
    async fn set_typing(&self, room: &RoomId, user: &UserId, is_typing: bool) -> Result<()> {
        {
            let mut typing = self.inner.typing.write().expect("typing lock");
            let entry = typing.entry(room.clone()).or_default();
            if is_typing {
                entry.insert(user.clone());
            } else {
                entry.remove(user);
            }
        }
        let _ = self.inner.presence_signal(room).send(());
        Ok(())
    }

    async fn watch(&self, room: &RoomId) -> Result<PresenceWatch> {
        let mut signal = self.inner.presence_signal(room).subscribe();
        let (tx, watch) = Watch::channel(WATCH_CAPACITY);
        let inner = self.inner.clone();
        let room = room.clone();

        tokio::spawn(async move {
            loop {
                let snapshot = inner.typing_snapshot(&room);
                if !tx.send(snapshot).await {
                    break;
                }
                match signal.recv().await {
                    Ok(()) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(watch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cove_shared::MessageStatus;

    fn record(ts: i64) -> MessageRecord {
        MessageRecord {
            id: Uuid::new_v4(),
            sender_id: UserId::new("u1"),
            sender_name: "Uno".into(),
            content: format!("m{ts}"),
            media_items: Vec::new(),
            timestamp: ts,
            status: MessageStatus::Sent,
        }
    }

    fn room() -> RoomId {
        RoomId::new("lobby")
    }

    #[tokio::test]
    async fn latest_is_capped_and_newest_first() {
        let store = MemoryRemote::new();
        for ts in 1..=5 {
            MessageLog::put(&store, &room(), record(ts)).await.unwrap();
        }

        let latest = store.latest(&room(), 3).await.unwrap();
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].timestamp, 5);
        assert_eq!(latest[2].timestamp, 3);
    }

    #[tokio::test]
    async fn put_is_an_upsert_by_id() {
        let store = MemoryRemote::new();
        let mut rec = record(10);
        MessageLog::put(&store, &room(), rec.clone()).await.unwrap();
        rec.content = "edited".into();
        MessageLog::put(&store, &room(), rec.clone()).await.unwrap();

        let latest = store.latest(&room(), 10).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].content, "edited");
    }

    #[tokio::test]
    async fn before_is_strictly_older() {
        let store = MemoryRemote::new();
        for ts in [10, 20, 30] {
            MessageLog::put(&store, &room(), record(ts)).await.unwrap();
        }

        let page = store.before(&room(), 20, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].timestamp, 10);

        let empty = store.before(&room(), 10, 10).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn set_status_on_missing_id_is_not_found() {
        let store = MemoryRemote::new();
        let err = store
            .set_status(&room(), Uuid::new_v4(), MessageStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn watch_delivers_initial_snapshot_then_changes() {
        let store = MemoryRemote::new();
        MessageLog::put(&store, &room(), record(1)).await.unwrap();

        let mut watch = store.watch_latest(&room(), 10).await.unwrap();
        let first = watch.recv().await.unwrap();
        assert_eq!(first.len(), 1);

        MessageLog::put(&store, &room(), record(2)).await.unwrap();
        let second = watch.recv().await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].timestamp, 2);
    }

    #[tokio::test]
    async fn cancelled_watch_stops_delivering() {
        let store = MemoryRemote::new();
        let mut watch = store.watch_latest(&room(), 10).await.unwrap();
        let _ = watch.recv().await.unwrap();

        watch.cancel();
        MessageLog::put(&store, &room(), record(1)).await.unwrap();
        assert!(watch.recv().await.is_none());
    }

    #[tokio::test]
    async fn blob_round_trip_and_delete() {
        let store = MemoryRemote::new();
        let rec = BlobRecord {
            id: Uuid::new_v4(),
            data: "aGVsbG8=".into(),
            mime_type: "image/png".into(),
            timestamp: 42,
        };
        BlobStore::put(&store, rec.clone()).await.unwrap();
        assert_eq!(store.get(rec.id).await.unwrap(), rec);

        BlobStore::delete(&store, rec.id).await.unwrap();
        assert!(matches!(
            store.get(rec.id).await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn presence_watch_tracks_set_and_clear() {
        let store = MemoryRemote::new();
        let user = UserId::new("typist");

        let mut watch = PresenceStore::watch(&store, &room()).await.unwrap();
        assert!(watch.recv().await.unwrap().is_empty());

        store.set_typing(&room(), &user, true).await.unwrap();
        let typing = watch.recv().await.unwrap();
        assert!(typing.contains(&user));

        store.set_typing(&room(), &user, false).await.unwrap();
        let typing = watch.recv().await.unwrap();
        assert!(typing.is_empty());
    }
}
