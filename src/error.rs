//! Error types for the broadcast channel.

use crate::types::SessionId;
use thiserror::Error;

/// Main error type for channel operations.
///
/// Truncated history and long-poll timeouts are not errors; they are
/// reported through [`PollOutcome`](crate::PollOutcome).
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Missing session identity: {0}")]
    MissingIdentity(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        ChannelError::Serialization(e.to_string())
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
