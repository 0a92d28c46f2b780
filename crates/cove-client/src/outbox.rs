//! Durable background sender.
//!
//! The worker drains the outbox table independently of any UI: jobs
//! are re-enumerated after a restart and resumed, every attempt ends
//! in a defined terminal or retry state, and no error escapes the
//! worker loop. Per job the pipeline is stage media, publish, settle.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cove_media::MediaStager;
use cove_remote::{MediaRecord, MessageLog, MessageRecord};
use cove_shared::constants::{BACKOFF_BASE_MS, MAX_SEND_ATTEMPTS};
use cove_shared::{now_ms, MessageStatus};
use cove_store::{Database, OutboxJob};
use rand::Rng;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;

const EVENT_CAPACITY: usize = 64;

/// Tunables for the worker. Defaults match production behavior;
/// tests shrink the timings.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Total attempts per job, first try included.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt; doubles per attempt,
    /// plus jitter.
    pub base_backoff: Duration,
    /// How often the queue is polled for due jobs between wakeups.
    pub poll_interval: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_SEND_ATTEMPTS,
            base_backoff: Duration::from_millis(BACKOFF_BASE_MS),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Progress signals emitted per job attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    /// An attempt is running.
    Started { message_id: Uuid },
    /// The message reached the remote log; the job is done.
    Sent { message_id: Uuid },
    /// The attempt failed; another will run after backoff.
    Retrying { message_id: Uuid, attempt: u32 },
    /// Retry budget exhausted. Only an explicit user retry (a fresh
    /// job) re-enters the pipeline.
    Failed { message_id: Uuid },
}

struct WorkerCtx {
    db: Arc<Mutex<Database>>,
    stager: MediaStager,
    log: Arc<dyn MessageLog>,
    config: OutboxConfig,
    events: broadcast::Sender<JobEvent>,
    wakeup: Arc<Notify>,
}

impl WorkerCtx {
    fn db(&self) -> std::sync::MutexGuard<'_, Database> {
        self.db.lock().expect("database lock poisoned")
    }
}

pub struct OutboxWorker;

impl OutboxWorker {
    /// Start the worker task. It runs until the handle is dropped or
    /// shut down, surviving any UI-side teardown of streams and
    /// sessions in the meantime.
    pub fn spawn(
        db: Arc<Mutex<Database>>,
        stager: MediaStager,
        log: Arc<dyn MessageLog>,
        config: OutboxConfig,
    ) -> OutboxHandle {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let wakeup = Arc::new(Notify::new());

        let ctx = Arc::new(WorkerCtx {
            db: db.clone(),
            stager,
            log,
            config,
            events: events.clone(),
            wakeup: wakeup.clone(),
        });

        let task = tokio::spawn(run_loop(ctx));

        OutboxHandle {
            db,
            wakeup,
            events,
            task,
        }
    }
}

/// Handle to the running worker.
pub struct OutboxHandle {
    db: Arc<Mutex<Database>>,
    wakeup: Arc<Notify>,
    events: broadcast::Sender<JobEvent>,
    task: JoinHandle<()>,
}

impl OutboxHandle {
    /// Persist a job and wake the worker. The write is durable before
    /// this returns; the send itself happens in the background.
    pub fn enqueue(&self, job: &OutboxJob) -> Result<()> {
        self.db
            .lock()
            .expect("database lock poisoned")
            .enqueue_job(job)?;
        debug!(msg_id = %job.message_id, room = %job.room_id, "outbox job enqueued");
        self.wakeup.notify_one();
        Ok(())
    }

    /// Subscribe to per-job progress events.
    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Stop the worker task. Queued jobs stay durable and resume on
    /// the next spawn.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for OutboxHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_loop(ctx: Arc<WorkerCtx>) {
    // Jobs left over from a previous process run resume from here.
    match ctx.db().pending_jobs() {
        Ok(jobs) if !jobs.is_empty() => {
            info!(count = jobs.len(), "recovered outbox jobs from previous run");
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "failed to enumerate outbox at startup"),
    }

    loop {
        let due = ctx.db().due_jobs(now_ms());
        match due {
            Ok(jobs) => {
                for job in jobs {
                    process_job(&ctx, job).await;
                }
            }
            Err(e) => error!(error = %e, "failed to read due outbox jobs"),
        }

        tokio::select! {
            _ = ctx.wakeup.notified() => {}
            _ = tokio::time::sleep(ctx.config.poll_interval) => {}
        }
    }
}

/// Run one attempt. Always leaves the job in a defined state: row
/// gone (sent or terminally failed) or rescheduled with backoff.
async fn process_job(ctx: &Arc<WorkerCtx>, job: OutboxJob) {
    let id = job.message_id;
    let _ = ctx.events.send(JobEvent::Started { message_id: id });
    debug!(msg_id = %id, attempt = job.attempts + 1, "outbox job started");

    match publish(ctx, &job).await {
        Ok(dropped) => {
            if dropped > 0 {
                warn!(msg_id = %id, dropped, "message sent with partial media");
            }
            remove_row(ctx, id);
            info!(msg_id = %id, "message published");
            let _ = ctx.events.send(JobEvent::Sent { message_id: id });
        }
        Err(e) => {
            warn!(msg_id = %id, error = %e, "outbox attempt failed");

            // Best-effort FAILED mark for other readers of the log;
            // its own failure is swallowed and never retried.
            if let Err(mark) = ctx
                .log
                .set_status(&job.room_id, id, MessageStatus::Failed)
                .await
            {
                debug!(msg_id = %id, error = %mark, "could not mark remote status failed");
            }

            let attempts = job.attempts + 1;
            if attempts >= ctx.config.max_attempts {
                remove_row(ctx, id);
                info!(msg_id = %id, attempts, "retry budget exhausted, job failed");
                let _ = ctx.events.send(JobEvent::Failed { message_id: id });
            } else {
                let delay = backoff_delay(ctx.config.base_backoff, attempts);
                let next = now_ms() + delay.as_millis() as i64;
                if let Err(e) = ctx.db().reschedule_job(id, attempts, next) {
                    error!(msg_id = %id, error = %e, "failed to reschedule outbox job");
                }
                debug!(
                    msg_id = %id,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    "outbox job rescheduled"
                );
                let _ = ctx.events.send(JobEvent::Retrying {
                    message_id: id,
                    attempt: attempts,
                });
            }
        }
    }
}

/// Stage every attachment independently, then upsert the finished
/// record. Returns how many attachments were dropped; a dropped
/// attachment never aborts the job.
async fn publish(ctx: &Arc<WorkerCtx>, job: &OutboxJob) -> Result<usize> {
    let mut media_items = Vec::new();
    let mut dropped = 0usize;

    for (path, mime) in job.media_paths.iter().zip(&job.media_types) {
        match ctx.stager.stage(Path::new(path), mime).await {
            Ok(media_id) => media_items.push(MediaRecord {
                id: Uuid::new_v4(),
                media_id,
                mime_type: mime.clone(),
            }),
            Err(e) => {
                dropped += 1;
                warn!(
                    msg_id = %job.message_id,
                    path = %path,
                    error = %e,
                    "media staging failed, dropping attachment"
                );
            }
        }
    }

    let record = MessageRecord {
        id: job.message_id,
        sender_id: job.sender_id.clone(),
        sender_name: job.sender_name.clone(),
        content: job.content.clone(),
        media_items,
        timestamp: job.timestamp_ms,
        status: MessageStatus::Sent,
    };

    ctx.log.put(&job.room_id, record).await?;
    Ok(dropped)
}

fn remove_row(ctx: &Arc<WorkerCtx>, id: Uuid) {
    if let Err(e) = ctx.db().remove_job(id) {
        error!(msg_id = %id, error = %e, "failed to remove outbox row");
    }
}

/// Exponential backoff with up to 25% jitter, capped at 64x base.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(6);
    let millis = (base.as_millis() as u64).saturating_mul(1u64 << exp);
    let jitter = rand::thread_rng().gen_range(0..=millis / 4);
    Duration::from_millis(millis + jitter)
}
