//! Unified error type for Shoutbox.

use shoutbox_protocol::{ErrorCode, ProtocolError};
use shoutbox_room::RoomError;
use shoutbox_session::SessionError;
use shoutbox_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ShoutboxError {
    /// A transport-level error (bind, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid value).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (bad name, no session, rate limited).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not found, full, game rules, store).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A request the connection handler refused before reaching a room.
    #[error("request rejected: {0}")]
    Rejected(ErrorCode),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ShoutboxError {
    /// The protocol error code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Session(e) => e.code(),
            Self::Room(e) => e.code(),
            Self::Rejected(code) => *code,
            Self::Transport(_) | Self::Protocol(_) | Self::Config(_) => ErrorCode::ServerError,
        }
    }

    /// The message shown to the client. Internal failures get the generic
    /// text so no detail leaks.
    pub fn client_message(&self) -> String {
        match self {
            Self::Room(RoomError::InvalidGameData(reason)) => reason.clone(),
            _ => self.code().default_message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let err: ShoutboxError = err.into();
        assert!(matches!(err, ShoutboxError::Transport(_)));
        assert!(err.to_string().contains("gone"));
        assert_eq!(err.code(), ErrorCode::ServerError);
    }

    #[test]
    fn test_from_session_error() {
        let err: ShoutboxError = SessionError::RateLimited("message").into();
        assert_eq!(err.code(), ErrorCode::RateLimit);
        assert_eq!(err.client_message(), "Too many messages. Slow down!");
    }

    #[test]
    fn test_from_room_error() {
        let err: ShoutboxError = RoomError::NoActiveGame.into();
        assert!(matches!(err, ShoutboxError::Room(_)));
        assert_eq!(err.code(), ErrorCode::NoActiveGame);
    }

    #[test]
    fn test_internal_room_error_hides_detail() {
        let err: ShoutboxError = RoomError::CodeGenerationExhausted(10).into();
        assert_eq!(err.code(), ErrorCode::ServerError);
        assert_eq!(err.client_message(), "Something went wrong");
    }

    #[test]
    fn test_game_data_reason_reaches_client() {
        let err: ShoutboxError = RoomError::InvalidGameData("rounds must be 1-5".into()).into();
        assert_eq!(err.client_message(), "rounds must be 1-5");
    }
}
