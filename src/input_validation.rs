//! Validation of values that end up inside request URLs or bodies.
//!
//! Task ids are interpolated into route paths, so they are checked before
//! any request is built.

use crate::error::{ClientError, Result};
use crate::error_codes::{ERR_DESTINATION_INCOMPLETE, ERR_INVALID_HOST, ERR_INVALID_TASK_ID};

const MAX_TASK_ID_LENGTH: usize = 100;
const MAX_HOST_LENGTH: usize = 253;

/// Validate a task id before it is used as a path segment.
pub fn validate_task_id(task_id: &str) -> Result<()> {
    if task_id.is_empty() {
        return Err(ClientError::validation(ERR_INVALID_TASK_ID, "Task ID cannot be empty"));
    }

    if task_id.len() > MAX_TASK_ID_LENGTH {
        return Err(ClientError::validation(
            ERR_INVALID_TASK_ID,
            format!(
                "Task ID too long: {} chars (max: {})",
                task_id.len(),
                MAX_TASK_ID_LENGTH
            ),
        ));
    }

    // Only allow alphanumeric, hyphen, underscore
    if !task_id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return Err(ClientError::validation(
            ERR_INVALID_TASK_ID,
            format!("Task ID contains invalid characters: '{}'", task_id),
        ));
    }

    Ok(())
}

/// Validate a destination host such as `http://192.168.1.20` or `zima.local:8080`.
pub fn validate_host(host: &str) -> Result<()> {
    let host = host.trim();
    let authority = host
        .strip_prefix("http://")
        .or_else(|| host.strip_prefix("https://"))
        .unwrap_or(host)
        .trim_end_matches('/');
    if authority.is_empty() {
        return Err(ClientError::validation(ERR_DESTINATION_INCOMPLETE, "Host is required"));
    }

    if host.len() > MAX_HOST_LENGTH {
        return Err(ClientError::validation(
            ERR_INVALID_HOST,
            format!("Host too long: {} chars (max: {})", host.len(), MAX_HOST_LENGTH),
        ));
    }

    if authority
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '\\' | '?' | '#' | '@'))
    {
        return Err(ClientError::validation(
            ERR_INVALID_HOST,
            format!("Host contains invalid characters: '{}'", host),
        ));
    }

    Ok(())
}
