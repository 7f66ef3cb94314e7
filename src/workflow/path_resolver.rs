use thiserror::Error;

use crate::api::types::StorageTarget;
use crate::error::ClientError;
use crate::error_codes::{ERR_PATH_TOO_LONG, ERR_PATH_TRAVERSAL};

/// Maximum accepted sub-path length, in characters
pub const MAX_SUB_PATH_LENGTH: usize = 255;

const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Path cannot contain ..")]
    Traversal,
    #[error("Path must be at most 255 characters")]
    TooLong,
}

impl PathError {
    pub fn code(&self) -> &'static str {
        match self {
            PathError::Traversal => ERR_PATH_TRAVERSAL,
            PathError::TooLong => ERR_PATH_TOO_LONG,
        }
    }
}

impl From<PathError> for ClientError {
    fn from(e: PathError) -> Self {
        ClientError::validation(e.code(), e.to_string())
    }
}

/// Validate a user-entered sub-path. Runs on every keystroke; a failure
/// blocks starting a migration, not typing.
pub fn validate_sub_path(sub_path: &str) -> Result<(), PathError> {
    if sub_path.contains("..") {
        return Err(PathError::Traversal);
    }

    if sub_path.chars().count() > MAX_SUB_PATH_LENGTH {
        return Err(PathError::TooLong);
    }

    Ok(())
}

/// Exactly one leading separator, no trailing separator. Empty stays empty.
pub fn normalize_sub_path(sub_path: &str) -> String {
    let trimmed = sub_path.trim().trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{SEPARATOR}{trimmed}")
}

/// Destination base path for a storage target plus sub-path. Without a
/// target the normalized sub-path is the whole path (manual entry).
pub fn resolve_base_path(storage: Option<&StorageTarget>, sub_path: &str) -> String {
    let normalized = normalize_sub_path(sub_path);
    let Some(storage) = storage else {
        return normalized;
    };

    let root = storage.path.trim_end_matches(SEPARATOR);
    let joined = format!("{root}{normalized}");
    if joined.is_empty() {
        SEPARATOR.to_string()
    } else {
        joined
    }
}
