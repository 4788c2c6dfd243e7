//! Identifiers and error codes shared by every layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identity of a participant.
///
/// Either supplied by the client (`localId` on `set_name`, so a browser can
/// keep its seat across reloads) or generated by the server. Rejoining a
/// room with the same `UserId` restores the existing seat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A six-character room code: ASCII letters and digits, stored uppercase.
///
/// Construct through [`RoomCode::parse`] (or `str::parse`) so that every
/// value in the system is already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Number of characters in every room code.
    pub const LEN: usize = 6;

    /// The alphabet codes are drawn from.
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Normalizes and validates a client-supplied code.
    ///
    /// Lowercase letters are accepted and uppercased.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the input is not exactly
    /// six ASCII alphanumeric characters.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let raw = raw.trim();
        if raw.len() != Self::LEN || !raw.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ProtocolError::InvalidMessage(format!(
                "room code must be {} letters or digits",
                Self::LEN
            )));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    /// Builds a code from positions in [`RoomCode::ALPHABET`], each taken
    /// modulo the alphabet size.
    pub fn from_indices(indices: [usize; Self::LEN]) -> Self {
        Self(
            indices
                .iter()
                .map(|&i| Self::ALPHABET[i % Self::ALPHABET.len()] as char)
                .collect(),
        )
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable error code carried by every outbound `error` event.
///
/// Errors are always reported to the initiating connection only and never
/// change room state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // -- validation --
    InvalidName,
    InvalidRoomCode,
    InvalidMessage,
    MessageTooLong,
    InvalidGameData,
    InvalidOption,
    InvalidAction,
    BadRequest,

    // -- authorization --
    NotAuthenticated,
    NotOwner,

    // -- resource --
    RoomNotFound,
    RoomFull,
    NameTaken,
    NotInRoom,
    GameActive,
    NoActiveGame,
    AlreadySubmitted,
    RateLimit,

    // -- internal --
    ServerError,
}

impl ErrorCode {
    /// A short human-readable description, safe to show to end users.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::InvalidName => {
                "Name must be 2-20 characters, alphanumeric, dash, or underscore only"
            }
            Self::InvalidRoomCode => "Room code must be 6 characters",
            Self::InvalidMessage => "Message cannot be empty",
            Self::MessageTooLong => "Message too long (max 500 chars)",
            Self::InvalidGameData => "Invalid game configuration",
            Self::InvalidOption => "Invalid option",
            Self::InvalidAction => "Action not valid for the active game",
            Self::BadRequest => "Malformed request",
            Self::NotAuthenticated => "Set name first",
            Self::NotOwner => "Only the room owner can do that",
            Self::RoomNotFound => "Room does not exist",
            Self::RoomFull => "Room is full (max 8 players)",
            Self::NameTaken => "This name is already taken in this room",
            Self::NotInRoom => "Join a room first",
            Self::GameActive => "A game is already running",
            Self::NoActiveGame => "No active game",
            Self::AlreadySubmitted => "Result already submitted for this round",
            Self::RateLimit => "Too many messages. Slow down!",
            Self::ServerError => "Something went wrong",
        }
    }

    /// The wire spelling of this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidName => "invalid_name",
            Self::InvalidRoomCode => "invalid_room_code",
            Self::InvalidMessage => "invalid_message",
            Self::MessageTooLong => "message_too_long",
            Self::InvalidGameData => "invalid_game_data",
            Self::InvalidOption => "invalid_option",
            Self::InvalidAction => "invalid_action",
            Self::BadRequest => "bad_request",
            Self::NotAuthenticated => "not_authenticated",
            Self::NotOwner => "not_owner",
            Self::RoomNotFound => "room_not_found",
            Self::RoomFull => "room_full",
            Self::NameTaken => "name_taken",
            Self::NotInRoom => "not_in_room",
            Self::GameActive => "game_active",
            Self::NoActiveGame => "no_active_game",
            Self::AlreadySubmitted => "already_submitted",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
