//! Error code constants.
//!
//! Validation failures carry one of these codes so a frontend can translate
//! them without parsing the human-readable message.

/// Sub-path contains a parent-directory token
pub const ERR_PATH_TRAVERSAL: &str = "ERR_PATH_TRAVERSAL";

/// Sub-path exceeds the maximum length
pub const ERR_PATH_TOO_LONG: &str = "ERR_PATH_TOO_LONG";

/// No source folder selected
pub const ERR_EMPTY_SELECTION: &str = "ERR_EMPTY_SELECTION";

/// Destination host, username or base path missing
pub const ERR_DESTINATION_INCOMPLETE: &str = "ERR_DESTINATION_INCOMPLETE";

/// Password missing (it is never restored after a reload)
pub const ERR_PASSWORD_REQUIRED: &str = "ERR_PASSWORD_REQUIRED";

/// Storage target reported unhealthy
pub const ERR_STORAGE_UNHEALTHY: &str = "ERR_STORAGE_UNHEALTHY";

/// Task id malformed
pub const ERR_INVALID_TASK_ID: &str = "ERR_INVALID_TASK_ID";

/// Host malformed
pub const ERR_INVALID_HOST: &str = "ERR_INVALID_HOST";
