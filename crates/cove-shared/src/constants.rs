/// Maximum staged media payload size in bytes (500 KiB).
///
/// Payloads above this are truncated, not rejected; see
/// `cove-media` for the degraded-output caveat.
pub const MAX_MEDIA_BYTES: usize = 500 * 1024;

/// Number of messages kept in the live stream window.
pub const LIVE_WINDOW: usize = 30;

/// Page size for backward pagination.
pub const PAGE_SIZE: usize = 30;

/// Total send attempts per outbox job (first try included).
pub const MAX_SEND_ATTEMPTS: u32 = 3;

/// Base delay for exponential retry backoff, in milliseconds.
pub const BACKOFF_BASE_MS: u64 = 10_000;

/// Minimum username length after trimming.
pub const USERNAME_MIN_CHARS: usize = 2;

/// Maximum username length after trimming.
pub const USERNAME_MAX_CHARS: usize = 20;
