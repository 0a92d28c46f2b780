use cove_remote::RemoteError;
use thiserror::Error;

/// Errors produced while staging or resolving media.
#[derive(Error, Debug)]
pub enum StagingError {
    /// The local file could not be read. Not retryable; the file is
    /// gone or inaccessible.
    #[error("Failed to read local media: {0}")]
    Read(#[from] std::io::Error),

    /// The blob store rejected or lost the operation.
    #[error("Blob store error: {0}")]
    Remote(#[from] RemoteError),

    /// A stored payload failed to decode.
    #[error("Stored payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl StagingError {
    /// Whether the failed operation may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            StagingError::Remote(e) => e.is_retryable(),
            StagingError::Read(_) | StagingError::Decode(_) => false,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StagingError>;
