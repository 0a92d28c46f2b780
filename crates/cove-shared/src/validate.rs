//! Input validation for user-authored data.

use crate::error::ValidationError;
use crate::types::MediaItem;
use crate::constants::{USERNAME_MAX_CHARS, USERNAME_MIN_CHARS};

/// Validate a display name, returning the trimmed form on success.
///
/// Bounds are checked on the trimmed string, counting characters
/// rather than bytes.
pub fn validate_username(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();

    if len == 0 {
        return Err(ValidationError::UsernameEmpty);
    }
    if len < USERNAME_MIN_CHARS {
        return Err(ValidationError::UsernameTooShort);
    }
    if len > USERNAME_MAX_CHARS {
        return Err(ValidationError::UsernameTooLong);
    }

    Ok(trimmed.to_string())
}

/// A draft is sendable when it has trimmed text or at least one
/// attachment. Returns the trimmed text on success.
pub fn validate_draft(text: &str, media: &[MediaItem]) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() && media.is_empty() {
        return Err(ValidationError::EmptyDraft);
    }
    Ok(trimmed.to_string())
}
