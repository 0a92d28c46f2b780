use thiserror::Error;

/// Input validation failures. Never retried; surfaced to the caller
/// immediately. The display strings are stable and user-facing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Username cannot be empty")]
    UsernameEmpty,

    #[error("Username must be at least 2 characters")]
    UsernameTooShort,

    #[error("Username must be less than 20 characters")]
    UsernameTooLong,

    /// A draft needs text or at least one attachment.
    #[error("Message cannot be empty")]
    EmptyDraft,
}
