//! The durable outbox queue.
//!
//! Jobs survive process restarts: a worker re-enumerates pending rows
//! at startup and resumes them. Rows are deleted on terminal success
//! or terminal failure; a row's presence means work remains.

use cove_shared::{RoomId, UserId};
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::OutboxJob;

impl Database {
    /// Insert a job, replacing any existing row with the same message
    /// id. Replacement resets attempt state, which is the intended
    /// semantics for an explicit user retry.
    pub fn enqueue_job(&self, job: &OutboxJob) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO outbox
             (message_id, room_id, sender_id, sender_name, content,
              timestamp_ms, media_paths, media_types, attempts, next_attempt_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.message_id.to_string(),
                job.room_id.as_str(),
                job.sender_id.as_str(),
                job.sender_name,
                job.content,
                job.timestamp_ms,
                serde_json::to_string(&job.media_paths)?,
                serde_json::to_string(&job.media_types)?,
                job.attempts,
                job.next_attempt_ms,
            ],
        )?;
        Ok(())
    }

    /// Jobs whose backoff deadline has passed, oldest deadline first.
    pub fn due_jobs(&self, now_ms: i64) -> Result<Vec<OutboxJob>> {
        let mut stmt = self.conn().prepare(
            "SELECT message_id, room_id, sender_id, sender_name, content,
                    timestamp_ms, media_paths, media_types, attempts, next_attempt_ms
             FROM outbox
             WHERE next_attempt_ms <= ?1
             ORDER BY next_attempt_ms ASC",
        )?;

        let rows = stmt.query_map(params![now_ms], row_to_job)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    /// All incomplete jobs, for restart recovery.
    pub fn pending_jobs(&self) -> Result<Vec<OutboxJob>> {
        let mut stmt = self.conn().prepare(
            "SELECT message_id, room_id, sender_id, sender_name, content,
                    timestamp_ms, media_paths, media_types, attempts, next_attempt_ms
             FROM outbox
             ORDER BY timestamp_ms ASC",
        )?;

        let rows = stmt.query_map([], row_to_job)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    /// Record a failed attempt and push the backoff deadline out.
    pub fn reschedule_job(&self, id: Uuid, attempts: u32, next_attempt_ms: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE outbox SET attempts = ?2, next_attempt_ms = ?3 WHERE message_id = ?1",
            params![id.to_string(), attempts, next_attempt_ms],
        )?;
        Ok(())
    }

    /// Remove a job on terminal success or terminal failure.
    pub fn remove_job(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM outbox WHERE message_id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Whether a job is queued for the given message id. Jobs are
    /// tagged by the id they carry so callers can target one.
    pub fn job_exists(&self, id: Uuid) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM outbox WHERE message_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxJob> {
    let id_str: String = row.get(0)?;
    let room_id: String = row.get(1)?;
    let sender_id: String = row.get(2)?;
    let sender_name: String = row.get(3)?;
    let content: String = row.get(4)?;
    let timestamp_ms: i64 = row.get(5)?;
    let paths_json: String = row.get(6)?;
    let types_json: String = row.get(7)?;
    let attempts: u32 = row.get(8)?;
    let next_attempt_ms: i64 = row.get(9)?;

    let message_id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let media_paths: Vec<String> = serde_json::from_str(&paths_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let media_types: Vec<String> = serde_json::from_str(&types_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(OutboxJob {
        message_id,
        room_id: RoomId::new(room_id),
        sender_id: UserId::new(sender_id),
        sender_name,
        content,
        timestamp_ms,
        media_paths,
        media_types,
        attempts,
        next_attempt_ms,
    })
}
