//! Error types for the room layer.

use shoutbox_protocol::{ErrorCode, RoomCode};

/// Errors from the external room store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend failed (connection lost, command rejected, ...).
    #[error("store backend error: {0}")]
    Backend(String),

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur during room operations.
///
/// Every variant is reported to the initiating connection only and leaves
/// the room unchanged.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No live room and no stored snapshot for this code.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room already has the maximum number of participants.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// Another participant in the room uses this name (case-insensitive).
    #[error("display name {0:?} is taken in this room")]
    NameTaken(String),

    /// The connection is not subscribed to this room.
    #[error("not in room")]
    NotInRoom,

    /// Only the room owner may do this.
    #[error("only the room owner can do that")]
    NotOwner,

    /// A game is already running.
    #[error("a game is already active")]
    GameActive,

    /// There is no game to act on.
    #[error("no active game")]
    NoActiveGame,

    /// Chat text was empty or whitespace only.
    #[error("message is empty")]
    InvalidMessage,

    /// Chat text exceeded the configured length.
    #[error("message longer than {max} characters")]
    MessageTooLong { max: usize },

    /// Game configuration was rejected.
    #[error("invalid game data: {0}")]
    InvalidGameData(String),

    /// A vote named an option that does not exist.
    #[error("option {0} does not exist")]
    InvalidOption(i64),

    /// The action does not apply to the active game.
    #[error("action {0:?} is not valid for the active game")]
    InvalidAction(&'static str),

    /// The participant already reported a result for this round.
    #[error("result already submitted for this round")]
    AlreadySubmitted,

    /// Every drawn room code collided with an existing room.
    #[error("no free room code after {0} attempts")]
    CodeGenerationExhausted(usize),

    /// The room actor stopped or its channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RoomError {
    /// The protocol error code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::RoomNotFound,
            Self::RoomFull(_) => ErrorCode::RoomFull,
            Self::NameTaken(_) => ErrorCode::NameTaken,
            Self::NotInRoom => ErrorCode::NotInRoom,
            Self::NotOwner => ErrorCode::NotOwner,
            Self::GameActive => ErrorCode::GameActive,
            Self::NoActiveGame => ErrorCode::NoActiveGame,
            Self::InvalidMessage => ErrorCode::InvalidMessage,
            Self::MessageTooLong { .. } => ErrorCode::MessageTooLong,
            Self::InvalidGameData(_) => ErrorCode::InvalidGameData,
            Self::InvalidOption(_) => ErrorCode::InvalidOption,
            Self::InvalidAction(_) => ErrorCode::InvalidAction,
            Self::AlreadySubmitted => ErrorCode::AlreadySubmitted,
            Self::CodeGenerationExhausted(_) | Self::Unavailable(_) | Self::Store(_) => {
                ErrorCode::ServerError
            }
        }
    }

    /// Returns `true` for failures that are not the client's fault.
    pub fn is_internal(&self) -> bool {
        self.code() == ErrorCode::ServerError
    }
}
