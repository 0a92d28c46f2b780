//! # cove-store
//!
//! Durable local state for the chat client, backed by SQLite.
//!
//! Two concerns live here: the single current-user record and the
//! outbox job queue that makes sends survive process restarts. The
//! crate exposes a synchronous `Database` handle wrapping a
//! `rusqlite::Connection` with typed helpers for both tables.

pub mod database;
pub mod migrations;
pub mod models;
pub mod outbox;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
