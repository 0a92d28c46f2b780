//! # cove-client
//!
//! The chat client core: durable outbox sending, the live merged
//! message stream, backward pagination, typing presence and the
//! session controller a UI drives. Screens and navigation live
//! outside this crate and talk to [`ChatSession`] only.

pub mod merge;
pub mod outbox;
pub mod paginate;
pub mod presence;
pub mod session;
pub mod stream;

mod error;

pub use error::{ClientError, Result};
pub use outbox::{JobEvent, OutboxConfig, OutboxHandle, OutboxWorker};
pub use paginate::Paginator;
pub use presence::PresenceStream;
pub use session::{ChatSession, ChatState, SessionConfig};
pub use stream::MessageStream;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the default tracing subscriber for embedders that do not
/// bring their own. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("cove_client=debug,cove_remote=info,cove_store=info,cove_media=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
