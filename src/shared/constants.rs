/// Prefix under which every relayed file is stored
pub const UPLOAD_KEY_PREFIX: &str = "uploads";

/// Number of records returned by /list
pub const LIST_PAGE_SIZE: i64 = 10;

/// Length of the sliding rate-limit window in seconds
pub const RATE_LIMIT_WINDOW_SECS: i64 = 24 * 60 * 60;

// =============================================================================
// REPLY TEXTS
// =============================================================================

/// Reply for faults that must not leak internal detail
pub const GENERIC_FAILURE_REPLY: &str = "Something went wrong. Try again later.";

pub const AUTH_REQUIRED_REPLY: &str = "Please authenticate using /auth <password> first.";

pub const NOT_FOUND_REPLY: &str = "File not found or you lack permission.";

pub const INVALID_KIND_REPLY: &str =
    "Please send a valid file (document, photo, video, audio, voice).";
