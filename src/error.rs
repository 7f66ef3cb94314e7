use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Non-zero envelope code, transport failure or undecodable response.
    #[error("{0}")]
    RequestFailed(String),

    /// Local precondition not met. Never reaches the server.
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    /// Error code for validation failures, `None` otherwise.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Validation { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_request_failure(&self) -> bool {
        matches!(self, Self::RequestFailed(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::RequestFailed(format!("Failed to parse response: {e}"))
        } else {
            Self::RequestFailed(format!("Network error: {e}"))
        }
    }
}
