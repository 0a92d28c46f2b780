//! The controller a chat screen drives.
//!
//! One `ChatSession` per open room. It owns the live stream, the
//! presence stream, the outbox worker and the paginator, folds all of
//! their updates into a single [`ChatState`] value and publishes it
//! through a tokio `watch` channel. UI layers render snapshots of that
//! value and call the command methods; they never touch the underlying
//! pipelines directly.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use cove_shared::constants::{LIVE_WINDOW, PAGE_SIZE};
use cove_shared::{
    validate_draft, validate_username, MediaItem, Message, RoomId, User, UserId,
};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cove_media::MediaStager;
use cove_remote::{BlobStore, MessageLog, PresenceStore};
use cove_store::{Database, OutboxJob};

use crate::error::{ClientError, Result};
use crate::outbox::{JobEvent, OutboxConfig, OutboxHandle, OutboxWorker};
use crate::paginate::Paginator;
use crate::presence::PresenceStream;
use crate::stream::MessageStream;

// ---------------------------------------------------------------------------
// Published state
// ---------------------------------------------------------------------------

/// Everything a chat screen renders, as one immutable value.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatState {
    pub current_user: Option<User>,
    /// Newest first: the live window followed by paged-in history.
    pub messages: Vec<Message>,
    pub draft_text: String,
    pub draft_media: Vec<MediaItem>,
    pub is_loading_more: bool,
    /// Sticky once an older page comes back empty.
    pub reached_end: bool,
    /// Other users currently typing. Never contains the current user.
    pub typing_users: HashSet<UserId>,
    /// Last user-visible failure, until cleared.
    pub error: Option<String>,
}

/// Session tunables. Defaults match production behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub live_window: usize,
    pub page_size: usize,
    pub outbox: OutboxConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            live_window: LIVE_WINDOW,
            page_size: PAGE_SIZE,
            outbox: OutboxConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SessionState {
    current_user: Option<User>,
    /// The merged live window from the message stream.
    live: Vec<Message>,
    /// Older pages, in fetch order (each page newest first).
    older: Vec<Message>,
    draft_text: String,
    draft_media: Vec<MediaItem>,
    is_loading_more: bool,
    reached_end: bool,
    typing_users: HashSet<UserId>,
    error: Option<String>,
}

impl SessionState {
    /// Compose the published view. Live entries win over paged ones
    /// with the same id; anything that slid out of both is gone.
    fn compose(&self) -> ChatState {
        let live_ids: HashSet<Uuid> = self.live.iter().map(|m| m.id).collect();
        let mut messages = self.live.clone();
        messages.extend(
            self.older
                .iter()
                .filter(|m| !live_ids.contains(&m.id))
                .cloned(),
        );

        let typing = match &self.current_user {
            Some(user) => self
                .typing_users
                .iter()
                .filter(|u| **u != user.id)
                .cloned()
                .collect(),
            None => self.typing_users.clone(),
        };

        ChatState {
            current_user: self.current_user.clone(),
            messages,
            draft_text: self.draft_text.clone(),
            draft_media: self.draft_media.clone(),
            is_loading_more: self.is_loading_more,
            reached_end: self.reached_end,
            typing_users: typing,
            error: self.error.clone(),
        }
    }
}

struct SessionShared {
    state: Mutex<SessionState>,
    tx: watch::Sender<ChatState>,
}

impl SessionShared {
    fn emit_locked(&self, state: &SessionState) {
        self.tx.send_replace(state.compose());
    }

    fn update(&self, f: impl FnOnce(&mut SessionState)) {
        let mut state = self.state.lock().expect("session lock");
        f(&mut state);
        self.emit_locked(&state);
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns one room's delivery pipelines and publishes [`ChatState`].
pub struct ChatSession {
    room: RoomId,
    db: Arc<Mutex<Database>>,
    log: Arc<dyn MessageLog>,
    stream: Arc<MessageStream>,
    presence: Arc<PresenceStream>,
    outbox: OutboxHandle,
    paginator: Paginator,
    config: SessionConfig,
    shared: Arc<SessionShared>,
    task: JoinHandle<()>,
}

impl ChatSession {
    /// Open a session for `room`. The outbox worker starts immediately
    /// and resumes any jobs persisted by a previous run.
    pub async fn open(
        room: RoomId,
        db: Arc<Mutex<Database>>,
        log: Arc<dyn MessageLog>,
        blobs: Arc<dyn BlobStore>,
        presence_store: Arc<dyn PresenceStore>,
        config: SessionConfig,
    ) -> Result<Self> {
        let current_user = db.lock().expect("database lock poisoned").current_user()?;

        let stream = Arc::new(
            MessageStream::open(log.clone(), room.clone(), config.live_window).await?,
        );
        let presence = Arc::new(PresenceStream::open(presence_store, room.clone()).await?);
        let outbox = OutboxWorker::spawn(
            db.clone(),
            MediaStager::new(blobs),
            log.clone(),
            config.outbox.clone(),
        );
        let paginator = Paginator::new(log.clone(), room.clone());

        let initial = SessionState {
            current_user,
            ..SessionState::default()
        };
        let (tx, _rx) = watch::channel(initial.compose());
        let shared = Arc::new(SessionShared {
            state: Mutex::new(initial),
            tx,
        });

        let task = tokio::spawn(fan_in(
            shared.clone(),
            stream.clone(),
            stream.subscribe(),
            presence.subscribe(),
            outbox.events(),
        ));

        info!(room = %room, "chat session opened");
        Ok(Self {
            room,
            db,
            log,
            stream,
            presence,
            outbox,
            paginator,
            config,
            shared,
            task,
        })
    }

    /// Observe the session state. The receiver always holds the latest
    /// composed value.
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.shared.tx.subscribe()
    }

    /// The current composed state.
    pub fn state(&self) -> ChatState {
        self.shared.tx.borrow().clone()
    }

    // -- sending ------------------------------------------------------------

    /// Send the current draft. The message appears immediately as a
    /// SENDING placeholder; the durable outbox delivers it in the
    /// background. Returns the message id.
    pub fn send(&self) -> Result<Uuid> {
        let (user, message) = {
            let state = self.shared.state.lock().expect("session lock");
            let user = state.current_user.clone().ok_or(ClientError::NoUser)?;
            let text = validate_draft(&state.draft_text, &state.draft_media)?;
            let message = Message::draft(&user, text, state.draft_media.clone());
            (user, message)
        };
        debug!(msg_id = %message.id, sender = %user.id, "sending draft");

        self.stream.insert_local(message.clone());
        let job = OutboxJob::for_message(&self.room, &message);
        if let Err(e) = self.outbox.enqueue(&job) {
            warn!(msg_id = %message.id, error = %e, "failed to enqueue send");
            self.stream.mark_failed(message.id);
            self.shared
                .update(|s| s.error = Some(format!("Failed to send message: {e}")));
            return Err(e);
        }

        self.shared.update(|s| {
            s.draft_text.clear();
            s.draft_media.clear();
        });
        Ok(message.id)
    }

    /// Retry a failed message. Reuses the id with a fresh timestamp,
    /// so the eventual remote copy supersedes the placeholder; the
    /// fresh job starts with a full retry budget.
    pub fn retry(&self, message_id: Uuid) -> Result<()> {
        let mut message = self
            .stream
            .local_message(message_id)
            .ok_or(ClientError::UnknownMessage(message_id))?;
        message.timestamp_ms = cove_shared::now_ms();
        message.status = cove_shared::MessageStatus::Sending;

        self.stream.insert_local(message.clone());
        let job = OutboxJob::for_message(&self.room, &message);
        if let Err(e) = self.outbox.enqueue(&job) {
            warn!(msg_id = %message_id, error = %e, "failed to enqueue retry");
            self.stream.mark_failed(message_id);
            self.shared
                .update(|s| s.error = Some(format!("Failed to send message: {e}")));
            return Err(e);
        }
        info!(msg_id = %message_id, "message retry enqueued");
        Ok(())
    }

    /// Delete a message everywhere it is held: the local overlay, any
    /// paged-in copy, and the remote log. Absent remote ids are fine.
    pub async fn delete(&self, message_id: Uuid) -> Result<()> {
        self.log.delete(&self.room, message_id).await?;
        self.stream.remove_local(message_id);
        self.shared
            .update(|s| s.older.retain(|m| m.id != message_id));
        info!(msg_id = %message_id, "message deleted");
        Ok(())
    }

    // -- history ------------------------------------------------------------

    /// Load the next page of older messages. A no-op while a load is
    /// in flight or after history is exhausted.
    pub async fn load_older(&self) -> Result<()> {
        let before_ts = {
            let mut state = self.shared.state.lock().expect("session lock");
            if state.is_loading_more || state.reached_end {
                return Ok(());
            }
            let oldest = state
                .live
                .iter()
                .chain(state.older.iter())
                .map(|m| m.timestamp_ms)
                .min();
            let Some(before_ts) = oldest else {
                // Nothing loaded yet; the live window is the anchor.
                return Ok(());
            };
            state.is_loading_more = true;
            self.shared.emit_locked(&state);
            before_ts
        };

        let page = match self.paginator.load_older(before_ts, self.config.page_size).await {
            Ok(page) => page,
            Err(e) => {
                warn!(room = %self.room, error = %e, "older page load failed");
                self.shared.update(|s| {
                    s.is_loading_more = false;
                    s.error = Some(format!("Failed to load older messages: {e}"));
                });
                return Err(e);
            }
        };

        self.shared.update(|s| {
            s.is_loading_more = false;
            if page.is_empty() {
                s.reached_end = true;
                return;
            }
            let held: HashSet<Uuid> = s
                .live
                .iter()
                .chain(s.older.iter())
                .map(|m| m.id)
                .collect();
            s.older
                .extend(page.into_iter().filter(|m| !held.contains(&m.id)));
        });
        Ok(())
    }

    // -- profile and presence ------------------------------------------------

    /// Validate and persist the display name for this device,
    /// replacing any existing profile.
    pub fn save_username(&self, device_id: UserId, raw_name: &str) -> Result<User> {
        let name = validate_username(raw_name)?;
        let user = User {
            id: device_id,
            name,
        };
        self.db
            .lock()
            .expect("database lock poisoned")
            .save_user(&user)?;
        self.shared
            .update(|s| s.current_user = Some(user.clone()));
        info!(user = %user.id, "user profile saved");
        Ok(user)
    }

    /// Set or clear this user's typing indicator. Debounce is the
    /// caller's concern.
    pub async fn set_typing(&self, is_typing: bool) -> Result<()> {
        let user = self
            .shared
            .state
            .lock()
            .expect("session lock")
            .current_user
            .clone()
            .ok_or(ClientError::NoUser)?;
        self.presence.set_typing(&user.id, is_typing).await
    }

    // -- draft editing -------------------------------------------------------

    pub fn set_draft_text(&self, text: impl Into<String>) {
        self.shared.update(|s| s.draft_text = text.into());
    }

    pub fn add_draft_media(&self, item: MediaItem) {
        self.shared.update(|s| s.draft_media.push(item));
    }

    /// Remove the draft attachment at `index`. Out-of-range indices
    /// are ignored.
    pub fn remove_draft_media(&self, index: usize) {
        self.shared.update(|s| {
            if index < s.draft_media.len() {
                s.draft_media.remove(index);
            }
        });
    }

    pub fn clear_error(&self) {
        self.shared.update(|s| s.error = None);
    }

    /// Tear down the session: stop the fan-in task and detach every
    /// pipeline. Queued outbox jobs stay durable for the next run.
    pub fn close(&self) {
        self.task.abort();
        self.stream.close();
        self.presence.close();
        self.outbox.shutdown();
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Fold stream, presence and outbox updates into the shared state.
async fn fan_in(
    shared: Arc<SessionShared>,
    stream: Arc<MessageStream>,
    mut stream_rx: watch::Receiver<Vec<Message>>,
    mut presence_rx: watch::Receiver<HashSet<UserId>>,
    mut events: broadcast::Receiver<JobEvent>,
) {
    // Values published before this task started are already marked
    // seen by the receivers; fold them in once up front.
    {
        let live = stream_rx.borrow_and_update().clone();
        let typing = presence_rx.borrow_and_update().clone();
        shared.update(|s| {
            s.live = live;
            s.typing_users = typing;
        });
    }

    loop {
        tokio::select! {
            changed = stream_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let live = stream_rx.borrow_and_update().clone();
                shared.update(|s| s.live = live);
            }
            changed = presence_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let typing = presence_rx.borrow_and_update().clone();
                shared.update(|s| s.typing_users = typing);
            }
            event = events.recv() => {
                match event {
                    Ok(JobEvent::Failed { message_id }) => {
                        stream.mark_failed(message_id);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "session lagged behind outbox events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{open_db, FlakyLog};
    use cove_remote::MemoryRemote;
    use cove_shared::MessageStatus;
    use std::time::Duration;
    use tokio::time::timeout;

    fn room() -> RoomId {
        RoomId::new("lobby")
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            live_window: 30,
            page_size: 10,
            outbox: OutboxConfig {
                max_attempts: 3,
                base_backoff: Duration::from_millis(20),
                poll_interval: Duration::from_millis(20),
            },
        }
    }

    async fn open_session(
        remote: Arc<MemoryRemote>,
        log: Arc<dyn MessageLog>,
        config: SessionConfig,
    ) -> (tempfile::TempDir, ChatSession) {
        let (dir, db) = open_db();
        let session = ChatSession::open(
            room(),
            db,
            log,
            remote.clone(),
            remote,
            config,
        )
        .await
        .unwrap();
        (dir, session)
    }

    async fn wait_state<F>(rx: &mut watch::Receiver<ChatState>, mut pred: F) -> ChatState
    where
        F: FnMut(&ChatState) -> bool,
    {
        timeout(Duration::from_secs(3), async {
            loop {
                {
                    let current = rx.borrow_and_update();
                    if pred(&current) {
                        return current.clone();
                    }
                }
                rx.changed().await.expect("session alive");
            }
        })
        .await
        .expect("condition within deadline")
    }

    #[tokio::test]
    async fn send_shows_placeholder_then_confirms() {
        let remote = Arc::new(MemoryRemote::new());
        let (_dir, session) = open_session(remote.clone(), remote.clone(), fast_config()).await;
        let mut rx = session.subscribe();

        session
            .save_username(UserId::new("device-1"), "Ada")
            .unwrap();
        session.set_draft_text("  hello world  ");
        let id = session.send().unwrap();

        // Draft cleared right away; placeholder visible until the
        // confirmed copy arrives under the same id.
        assert!(session.state().draft_text.is_empty());
        let state = wait_state(&mut rx, |s| {
            s.messages
                .iter()
                .any(|m| m.id == id && m.status == MessageStatus::Sent)
        })
        .await;
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "hello world");
    }

    #[tokio::test]
    async fn empty_draft_is_rejected() {
        let remote = Arc::new(MemoryRemote::new());
        let (_dir, session) = open_session(remote.clone(), remote.clone(), fast_config()).await;
        session
            .save_username(UserId::new("device-1"), "Ada")
            .unwrap();

        session.set_draft_text("   ");
        let err = session.send().unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(err.to_string(), "Message cannot be empty");
    }

    #[tokio::test]
    async fn send_without_profile_is_rejected() {
        let remote = Arc::new(MemoryRemote::new());
        let (_dir, session) = open_session(remote.clone(), remote.clone(), fast_config()).await;
        session.set_draft_text("hi");
        assert!(matches!(session.send(), Err(ClientError::NoUser)));
    }

    #[tokio::test]
    async fn exhausted_retries_leave_a_failed_placeholder() {
        let remote = Arc::new(MemoryRemote::new());
        let flaky = Arc::new(FlakyLog::always_failing());
        let (_dir, session) = open_session(remote, flaky, fast_config()).await;
        let mut rx = session.subscribe();

        session
            .save_username(UserId::new("device-1"), "Ada")
            .unwrap();
        session.set_draft_text("doomed");
        let id = session.send().unwrap();

        let state = wait_state(&mut rx, |s| {
            s.messages
                .iter()
                .any(|m| m.id == id && m.status == MessageStatus::Failed)
        })
        .await;
        // The failed placeholder stays visible for an explicit retry.
        assert_eq!(state.messages.len(), 1);
    }

    #[tokio::test]
    async fn explicit_retry_recovers_a_failed_message() {
        let remote = Arc::new(MemoryRemote::new());
        let flaky = Arc::new(FlakyLog::failing_next(3));
        let (_dir, session) = open_session(remote, flaky.clone(), fast_config()).await;
        let mut rx = session.subscribe();

        session
            .save_username(UserId::new("device-1"), "Ada")
            .unwrap();
        session.set_draft_text("second wind");
        let id = session.send().unwrap();

        wait_state(&mut rx, |s| {
            s.messages
                .iter()
                .any(|m| m.id == id && m.status == MessageStatus::Failed)
        })
        .await;

        session.retry(id).unwrap();
        let state = wait_state(&mut rx, |s| {
            s.messages
                .iter()
                .any(|m| m.id == id && m.status == MessageStatus::Sent)
        })
        .await;
        // Same logical message throughout: never duplicated.
        assert_eq!(state.messages.iter().filter(|m| m.id == id).count(), 1);
    }

    #[tokio::test]
    async fn retry_enqueue_failure_marks_the_placeholder_failed() {
        let remote = Arc::new(MemoryRemote::new());
        let flaky = Arc::new(FlakyLog::always_failing());
        let (_dir, db) = open_db();
        let session = ChatSession::open(
            room(),
            db.clone(),
            flaky,
            remote.clone(),
            remote,
            fast_config(),
        )
        .await
        .unwrap();
        let mut rx = session.subscribe();

        session
            .save_username(UserId::new("device-1"), "Ada")
            .unwrap();
        session.set_draft_text("twice doomed");
        let id = session.send().unwrap();
        wait_state(&mut rx, |s| {
            s.messages
                .iter()
                .any(|m| m.id == id && m.status == MessageStatus::Failed)
        })
        .await;

        // Break the queue underneath the session so enqueue fails.
        db.lock()
            .unwrap()
            .conn()
            .execute_batch("DROP TABLE outbox")
            .unwrap();

        assert!(session.retry(id).is_err());
        // The placeholder must not stay stuck as SENDING: it flips
        // back to FAILED and the failure is surfaced.
        let state = wait_state(&mut rx, |s| {
            s.error.is_some()
                && s.messages
                    .iter()
                    .any(|m| m.id == id && m.status == MessageStatus::Failed)
        })
        .await;
        assert!(state.error.unwrap().starts_with("Failed to send message"));
    }

    #[tokio::test]
    async fn retry_of_unknown_message_is_an_error() {
        let remote = Arc::new(MemoryRemote::new());
        let (_dir, session) = open_session(remote.clone(), remote.clone(), fast_config()).await;
        assert!(matches!(
            session.retry(Uuid::new_v4()),
            Err(ClientError::UnknownMessage(_))
        ));
    }

    #[tokio::test]
    async fn pagination_appends_without_duplicates_and_end_is_sticky() {
        let remote = Arc::new(MemoryRemote::new());
        let user = User {
            id: UserId::new("u1"),
            name: "Uno".into(),
        };
        for ts in 1..=40i64 {
            let mut m = Message::draft(&user, format!("m{ts}"), Vec::new());
            m.timestamp_ms = ts;
            m.status = MessageStatus::Sent;
            MessageLog::put(&*remote, &room(), cove_remote::MessageRecord::from_message(&m))
                .await
                .unwrap();
        }

        let (_dir, session) = open_session(remote.clone(), remote.clone(), fast_config()).await;
        let mut rx = session.subscribe();

        // Live window holds the newest 30.
        let state = wait_state(&mut rx, |s| s.messages.len() == 30).await;
        assert_eq!(state.messages[0].timestamp_ms, 40);
        assert_eq!(state.messages[29].timestamp_ms, 11);

        session.load_older().await.unwrap();
        let state = wait_state(&mut rx, |s| s.messages.len() == 40).await;
        let ids: HashSet<Uuid> = state.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 40);
        assert_eq!(state.messages[39].timestamp_ms, 1);
        assert!(!state.reached_end);

        session.load_older().await.unwrap();
        let state = wait_state(&mut rx, |s| s.reached_end).await;
        assert_eq!(state.messages.len(), 40);

        // Further calls stay no-ops.
        session.load_older().await.unwrap();
        assert_eq!(session.state().messages.len(), 40);
    }

    #[tokio::test]
    async fn username_validation_and_persistence() {
        let remote = Arc::new(MemoryRemote::new());
        let (_dir, session) = open_session(remote.clone(), remote.clone(), fast_config()).await;

        let err = session
            .save_username(UserId::new("device-1"), "a")
            .unwrap_err();
        assert_eq!(err.to_string(), "Username must be at least 2 characters");
        assert!(session.state().current_user.is_none());

        let user = session
            .save_username(UserId::new("device-1"), "  Ada  ")
            .unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(session.state().current_user, Some(user));
    }

    #[tokio::test]
    async fn typing_shows_others_and_filters_self() {
        let remote = Arc::new(MemoryRemote::new());
        let (_dir, session) = open_session(remote.clone(), remote.clone(), fast_config()).await;
        let mut rx = session.subscribe();

        session
            .save_username(UserId::new("device-1"), "Ada")
            .unwrap();

        // Own typing indicator is published but never rendered back.
        session.set_typing(true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(session.state().typing_users.is_empty());

        let other = UserId::new("device-2");
        remote.set_typing(&room(), &other, true).await.unwrap();
        wait_state(&mut rx, |s| s.typing_users.contains(&other)).await;

        remote.set_typing(&room(), &other, false).await.unwrap();
        wait_state(&mut rx, |s| s.typing_users.is_empty()).await;
    }

    #[tokio::test]
    async fn delete_removes_local_and_remote_copies() {
        let remote = Arc::new(MemoryRemote::new());
        let (_dir, session) = open_session(remote.clone(), remote.clone(), fast_config()).await;
        let mut rx = session.subscribe();

        session
            .save_username(UserId::new("device-1"), "Ada")
            .unwrap();
        session.set_draft_text("short lived");
        let id = session.send().unwrap();
        wait_state(&mut rx, |s| {
            s.messages
                .iter()
                .any(|m| m.id == id && m.status == MessageStatus::Sent)
        })
        .await;

        session.delete(id).await.unwrap();
        wait_state(&mut rx, |s| s.messages.is_empty()).await;
        assert!(remote.latest(&room(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn draft_media_editing_is_bounds_guarded() {
        let remote = Arc::new(MemoryRemote::new());
        let (_dir, session) = open_session(remote.clone(), remote.clone(), fast_config()).await;

        session.add_draft_media(MediaItem::local("/tmp/a.png", "image/png"));
        session.add_draft_media(MediaItem::local("/tmp/b.png", "image/png"));
        session.remove_draft_media(5);
        assert_eq!(session.state().draft_media.len(), 2);

        session.remove_draft_media(0);
        let state = session.state();
        assert_eq!(state.draft_media.len(), 1);
        assert_eq!(state.draft_media[0].local_path.as_deref(), Some("/tmp/b.png"));
    }
}
