//! Outbound protocol events.
//!
//! Frames have the same `{"event": "<name>", "data": {...}}` shape as
//! inbound events. They live here rather than in `shoutbox-protocol`
//! because they carry room snapshots.

use serde::{Deserialize, Serialize};
use shoutbox_protocol::{ErrorCode, RoomCode, UserId};
use shoutbox_room::{GameState, Message, Participant, Room, RoomEvent};

use crate::ShoutboxError;

/// An event sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Reply to `set_name`.
    SessionCreated { session_token: String, user_id: UserId },
    /// Full room snapshot, sent to a connection that just joined.
    RoomJoined { room_code: RoomCode, room_state: Box<Room> },
    /// A message was appended to the room's history.
    NewMessage { message: Message },
    /// The participant list changed.
    ParticipantUpdate { participants: Vec<Participant> },
    /// The active game changed or ended.
    GameUpdate { game_state: GameState },
    /// A message was removed from the room's history.
    MessageRemoved { message_id: String },
    /// Reply to `leave_room`.
    RoomLeft { room_code: RoomCode },
    /// A request was rejected. Sent to the requesting connection only.
    Error { code: ErrorCode, message: String },
}

impl ServerEvent {
    /// An `error` event with the code's default text.
    pub fn error(code: ErrorCode) -> Self {
        Self::Error {
            code,
            message: code.default_message().to_string(),
        }
    }

    /// The `error` event reporting `err`.
    pub fn rejected(err: &ShoutboxError) -> Self {
        Self::Error {
            code: err.code(),
            message: err.client_message(),
        }
    }
}

impl From<RoomEvent> for ServerEvent {
    fn from(event: RoomEvent) -> Self {
        match event {
            RoomEvent::Joined(room) => Self::RoomJoined {
                room_code: room.room_code.clone(),
                room_state: room,
            },
            RoomEvent::NewMessage(message) => Self::NewMessage { message },
            RoomEvent::ParticipantUpdate(participants) => Self::ParticipantUpdate { participants },
            RoomEvent::GameUpdate(game_state) => Self::GameUpdate { game_state },
            RoomEvent::MessageRemoved(message_id) => Self::MessageRemoved { message_id },
        }
    }
}
