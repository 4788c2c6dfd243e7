//! Inbound protocol events.
//!
//! Every frame a client sends is one JSON object of the form
//! `{"event": "<name>", "data": {...}}`. Events without a payload omit
//! `data`. Field names inside payloads are camelCase to match the browser
//! client.

use serde::{Deserialize, Serialize};

use crate::{Codec, ErrorCode};

/// An event sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Choose a display name and obtain a session.
    SetName(SetName),
    /// Create a new room owned by the caller.
    CreateRoom,
    /// Join an existing room by code.
    JoinRoom(JoinRoom),
    /// Post a chat message to the current room.
    SendMessage(SendMessage),
    /// Leave the current room.
    LeaveRoom,
    /// Start a game in the current room (owner only).
    StartGame(StartGame),
    /// Act in the active game.
    GameAction(GameAction),
}

impl ClientEvent {
    /// Picks the error code to report for a frame that failed to decode.
    ///
    /// A recognizable event name with a bad payload maps to that event's
    /// validation error; anything else is a `bad_request`.
    pub fn decode_error_code(codec: &impl Codec, data: &[u8]) -> ErrorCode {
        #[derive(Deserialize)]
        struct EventName {
            event: String,
        }

        let Ok(EventName { event }) = codec.decode::<EventName>(data) else {
            return ErrorCode::BadRequest;
        };
        match event.as_str() {
            "set_name" => ErrorCode::InvalidName,
            "join_room" => ErrorCode::InvalidRoomCode,
            "send_message" => ErrorCode::InvalidMessage,
            "start_game" => ErrorCode::InvalidGameData,
            "game_action" => ErrorCode::InvalidAction,
            _ => ErrorCode::BadRequest,
        }
    }
}

/// Payload of `set_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetName {
    pub display_name: String,
    /// Identity the browser kept from a previous visit.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "localUUID")]
    pub local_id: Option<String>,
}

/// Payload of `join_room`. The code is validated by the handler so that a
/// malformed code is reported as `invalid_room_code`, not `bad_request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room_code: String,
}

/// Payload of `send_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    pub text: String,
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

/// Payload of `start_game`: `{"gameType": "poll" | "tile-sort", "gameData": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gameType", content = "gameData", rename_all = "kebab-case")]
pub enum StartGame {
    Poll(PollSetup),
    TileSort(TileSortSetup),
}

/// Configuration for a new poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSetup {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Seconds until the poll closes by itself. `None` means untimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default = "default_true")]
    pub show_realtime: bool,
    #[serde(default)]
    pub multiple_choice: bool,
}

fn default_true() -> bool {
    true
}

/// Configuration for a new tile-sort game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TileSortSetup {
    /// One or more identical rounds with explicit settings.
    Custom(CustomRounds),
    /// The fixed three-round preset of increasing grid size.
    Tournament,
}

/// Settings for [`TileSortSetup::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRounds {
    pub grid_size: u8,
    pub time_limit: u32,
    #[serde(default = "default_color_count")]
    pub color_count: u8,
    #[serde(default = "default_rounds")]
    pub rounds: u8,
}

fn default_color_count() -> u8 {
    3
}

fn default_rounds() -> u8 {
    1
}

/// Payload of `game_action`: `{"action": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum GameAction {
    /// Vote in the active poll.
    Vote(Vote),
    /// Close the active poll now and publish results (owner only).
    End,
    /// Abort the active game without results (owner only).
    Cancel,
    /// Report the caller's outcome for the current tile-sort round.
    SubmitResult(ResultReport),
}

/// Payload of a poll vote.
///
/// Signed so that a negative index is reported as `invalid_option` rather
/// than failing to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub option_index: i64,
}

/// A participant's self-reported tile-sort outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultReport {
    /// Seconds from round start to solve; `None` on timeout.
    #[serde(default)]
    pub completion_time: Option<f64>,
    #[serde(default)]
    pub clicks: u32,
    /// Client-computed score. Computed by the server when omitted.
    #[serde(default)]
    pub score: Option<u32>,
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JsonCodec;

    fn parse(json: &str) -> ClientEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_set_name_accepts_legacy_local_uuid() {
        let event = parse(r#"{"event":"set_name","data":{"displayName":"alice","localUUID":"u-1"}}"#);
        assert_eq!(
            event,
            ClientEvent::SetName(SetName {
                display_name: "alice".into(),
                local_id: Some("u-1".into()),
            })
        );
    }

    #[test]
    fn test_unit_events_need_no_data() {
        assert_eq!(parse(r#"{"event":"create_room"}"#), ClientEvent::CreateRoom);
        assert_eq!(parse(r#"{"event":"leave_room"}"#), ClientEvent::LeaveRoom);
    }

    #[test]
    fn test_start_poll_defaults() {
        let event = parse(
            r#"{"event":"start_game","data":{"gameType":"poll","gameData":{"question":"Color?","options":["Red","Blue"]}}}"#,
        );
        let ClientEvent::StartGame(StartGame::Poll(setup)) = event else {
            panic!("expected poll start, got {event:?}");
        };
        assert_eq!(setup.duration, None);
        assert!(setup.show_realtime);
        assert!(!setup.multiple_choice);
    }

    #[test]
    fn test_start_tile_sort_tournament() {
        let event = parse(
            r#"{"event":"start_game","data":{"gameType":"tile-sort","gameData":{"mode":"tournament"}}}"#,
        );
        assert_eq!(event, ClientEvent::StartGame(StartGame::TileSort(TileSortSetup::Tournament)));
    }

    #[test]
    fn test_start_tile_sort_custom() {
        let event = parse(
            r#"{"event":"start_game","data":{"gameType":"tile-sort","gameData":{"mode":"custom","gridSize":4,"timeLimit":120}}}"#,
        );
        assert_eq!(
            event,
            ClientEvent::StartGame(StartGame::TileSort(TileSortSetup::Custom(CustomRounds {
                grid_size: 4,
                time_limit: 120,
                color_count: 3,
                rounds: 1,
            })))
        );
    }

    #[test]
    fn test_game_action_vote_allows_negative_index() {
        let event = parse(r#"{"event":"game_action","data":{"action":"vote","data":{"optionIndex":-1}}}"#);
        assert_eq!(event, ClientEvent::GameAction(GameAction::Vote(Vote { option_index: -1 })));
    }

    #[test]
    fn test_game_action_submit_timeout() {
        let event = parse(
            r#"{"event":"game_action","data":{"action":"submit_result","data":{"completionTime":null,"clicks":12,"completed":false}}}"#,
        );
        let ClientEvent::GameAction(GameAction::SubmitResult(report)) = event else {
            panic!("expected submit_result");
        };
        assert_eq!(report.completion_time, None);
        assert_eq!(report.score, None);
        assert!(!report.completed);
    }

    #[test]
    fn test_decode_error_code_by_event_name() {
        let codec = JsonCodec;
        let code = ClientEvent::decode_error_code(
            &codec,
            br#"{"event":"start_game","data":{"gameType":"chess"}}"#,
        );
        assert_eq!(code, ErrorCode::InvalidGameData);
        let code = ClientEvent::decode_error_code(&codec, br#"{"event":"fly_to_moon"}"#);
        assert_eq!(code, ErrorCode::BadRequest);
        let code = ClientEvent::decode_error_code(&codec, b"garbage");
        assert_eq!(code, ErrorCode::BadRequest);
    }

    #[test]
    fn test_unknown_event_fails_to_decode() {
        let result: Result<ClientEvent, _> = serde_json::from_str(r#"{"event":"fly_to_moon"}"#);
        assert!(result.is_err());
    }
}
