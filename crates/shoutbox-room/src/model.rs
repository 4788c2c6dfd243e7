//! The room data model: participants, messages, and the room itself.
//!
//! Everything here is plain data that serializes to the JSON clients see in
//! `room_joined`, `new_message` and `participant_update`, and that the
//! store persists as the room snapshot.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use shoutbox_protocol::{RoomCode, UserId};
use shoutbox_session::random_id;

use crate::game::{GameEventPayload, GameState};
use crate::log::MessageLog;

/// Milliseconds since the Unix epoch.
pub type Millis = u64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Millis)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A member of a room. Records are never removed, only marked offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    pub joined_at: Millis,
    pub is_online: bool,
}

impl Participant {
    /// A freshly joined, online participant.
    pub fn new(user_id: UserId, display_name: impl Into<String>, now: Millis) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            joined_at: now,
            is_online: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One entry in a room's history.
///
/// On the wire: `{"id", "type", "timestamp", "sender", "payload"}` where
/// `type` is `chat`, `system` or `game-event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(flatten)]
    pub body: MessageBody,
    pub timestamp: Millis,
    /// The posting participant; `None` for system and game messages.
    pub sender: Option<UserId>,
}

/// The typed payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum MessageBody {
    Chat(ChatPayload),
    System(SystemEvent),
    GameEvent(GameEventPayload),
}

/// Payload of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub text: String,
    pub display_name: String,
}

/// Payload of a system message: `{"event": "...", "metadata": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "metadata",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum SystemEvent {
    RoomCreated { room_code: RoomCode },
    UserJoined { user_name: String },
    UserLeft { user_name: String },
}

impl Message {
    /// A chat message from `sender`.
    pub fn chat(sender: UserId, display_name: &str, text: String, now: Millis) -> Self {
        Self {
            id: random_id(),
            body: MessageBody::Chat(ChatPayload {
                text,
                display_name: display_name.to_string(),
            }),
            timestamp: now,
            sender: Some(sender),
        }
    }

    /// A system notice.
    pub fn system(event: SystemEvent, now: Millis) -> Self {
        Self {
            id: random_id(),
            body: MessageBody::System(event),
            timestamp: now,
            sender: None,
        }
    }

    /// A game announcement.
    pub fn game_event(payload: GameEventPayload, now: Millis) -> Self {
        Self {
            id: random_id(),
            body: MessageBody::GameEvent(payload),
            timestamp: now,
            sender: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// The authoritative state of one room.
///
/// Owned by the room actor; everything else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_code: RoomCode,
    pub created_at: Millis,
    pub last_activity: Millis,
    pub owner_id: UserId,
    pub participants: Vec<Participant>,
    pub messages: MessageLog,
    pub game_state: GameState,
}

impl Room {
    /// A new room with `owner` as its only participant and a
    /// `room_created` notice as its first message.
    pub fn new(room_code: RoomCode, owner: Participant, history_limit: usize) -> Self {
        let now = owner.joined_at;
        let mut messages = MessageLog::new(history_limit);
        messages.push(Message::system(
            SystemEvent::RoomCreated {
                room_code: room_code.clone(),
            },
            now,
        ));
        Self {
            room_code,
            created_at: now,
            last_activity: now,
            owner_id: owner.user_id.clone(),
            participants: vec![owner],
            messages,
            game_state: GameState::None,
        }
    }

    /// Returns `true` if `user` created this room.
    pub fn is_owner(&self, user: &UserId) -> bool {
        self.owner_id == *user
    }

    /// The participant record for `user`, if any.
    pub fn participant(&self, user: &UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == *user)
    }

    /// Mutable participant record for `user`, if any.
    pub fn participant_mut(&mut self, user: &UserId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == *user)
    }

    /// Returns `true` if someone other than `user` already uses `name`,
    /// ignoring ASCII case.
    pub fn name_taken_by_other(&self, name: &str, user: &UserId) -> bool {
        self.participants
            .iter()
            .any(|p| p.user_id != *user && p.display_name.eq_ignore_ascii_case(name))
    }

    /// Ids of participants currently online.
    pub fn online_users(&self) -> Vec<UserId> {
        self.participants
            .iter()
            .filter(|p| p.is_online)
            .map(|p| p.user_id.clone())
            .collect()
    }

    /// Checks and normalizes chat text.
    ///
    /// # Errors
    /// [`RoomError::InvalidMessage`](crate::RoomError::InvalidMessage) for
    /// empty or whitespace-only text,
    /// [`RoomError::MessageTooLong`](crate::RoomError::MessageTooLong) when
    /// the untrimmed text exceeds `max_len` characters.
    pub fn validate_chat_text(text: &str, max_len: usize) -> Result<String, crate::RoomError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(crate::RoomError::InvalidMessage);
        }
        if text.chars().count() > max_len {
            return Err(crate::RoomError::MessageTooLong { max: max_len });
        }
        Ok(trimmed.to_string())
    }
}
