//! Error types for the session layer.

use shoutbox_protocol::ErrorCode;

/// Errors that can occur while establishing or using a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The requested display name is empty, too short, too long, or
    /// contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid display name {0:?}")]
    InvalidName(String),

    /// No session exists for the given token. Either `set_name` was never
    /// sent, or the session has since been replaced.
    #[error("unknown session token")]
    UnknownToken,

    /// The participant exceeded the allowed rate for an action.
    #[error("rate limit exceeded for {0}")]
    RateLimited(&'static str),
}

impl SessionError {
    /// The protocol error code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidName(_) => ErrorCode::InvalidName,
            Self::UnknownToken => ErrorCode::NotAuthenticated,
            Self::RateLimited(_) => ErrorCode::RateLimit,
        }
    }
}
