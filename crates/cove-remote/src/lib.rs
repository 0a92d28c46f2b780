//! Remote capability layer: the append log, blob store and presence
//! map the chat core talks to, expressed as async traits.
//!
//! The real backend is an external service; this crate ships the trait
//! seams, the wire record shapes, a cancel-safe subscription handle,
//! and a complete in-memory backend used by tests and local runs.

pub mod blob;
pub mod log;
pub mod memory;
pub mod presence;
pub mod record;
pub mod subscription;

mod error;

pub use blob::{BlobRecord, BlobStore};
pub use error::{RemoteError, Result};
pub use log::{LogWatch, MessageLog};
pub use memory::MemoryRemote;
pub use presence::{PresenceStore, PresenceWatch};
pub use record::{MediaRecord, MessageRecord};
pub use subscription::{Watch, WatchSender};
