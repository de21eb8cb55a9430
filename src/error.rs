//! Error types for collaborator calls
//!
//! Every outbound call the orchestrator makes (metadata lookup, remote
//! commands, advisor, link checks, chat, broadcast) reports failures through
//! [`CollaboratorError`]. The orchestrator never lets these escape a run; each
//! component turns them into degraded content instead.

use std::fmt;

/// Result type alias for collaborator operations
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Errors that can occur while talking to an external collaborator
#[derive(Debug)]
pub enum CollaboratorError {
    /// The collaborator could not be reached (connect error, timeout, ...)
    Unavailable(String),

    /// A remote command invocation is not registered yet
    ///
    /// This is the only retryable error while polling a command.
    NotRegistered(String),

    /// The collaborator answered with a non-success status
    Rejected { status: u16, body: String },

    /// The response could not be decoded
    Decode(String),
}

impl CollaboratorError {
    /// Whether a poll should be retried after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollaboratorError::NotRegistered(_))
    }
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollaboratorError::Unavailable(msg) => write!(f, "collaborator unavailable: {}", msg),
            CollaboratorError::NotRegistered(msg) => {
                write!(f, "invocation does not exist yet: {}", msg)
            }
            CollaboratorError::Rejected { status, body } => {
                write!(f, "request rejected with status {}: {}", status, body)
            }
            CollaboratorError::Decode(msg) => write!(f, "invalid collaborator response: {}", msg),
        }
    }
}

impl std::error::Error for CollaboratorError {}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CollaboratorError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            CollaboratorError::Rejected {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            CollaboratorError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        CollaboratorError::Decode(err.to_string())
    }
}
