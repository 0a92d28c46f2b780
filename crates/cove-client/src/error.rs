use cove_media::StagingError;
use cove_remote::RemoteError;
use cove_shared::ValidationError;
use cove_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the chat client core.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Rejected input. Never retried.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The remote log, blob or presence store failed.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Local durable state failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Media staging failed.
    #[error("Media error: {0}")]
    Staging(#[from] StagingError),

    /// An operation needs the current user, but onboarding has not
    /// completed.
    #[error("No user profile configured")]
    NoUser,

    /// The referenced message is not held locally.
    #[error("Unknown message: {0}")]
    UnknownMessage(Uuid),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
