use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the remote capability layer.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport or store hiccup. Retryable.
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// The subscription or backing store has been shut down.
    #[error("Remote subscription closed")]
    Closed,

    /// Point lookup found no record under the given id.
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    /// A record failed to encode or decode.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RemoteError {
    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RemoteError>;
