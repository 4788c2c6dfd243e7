//! Game state shared by the room and its mini-games.

use std::fmt;

use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use shoutbox_session::random_id;

use crate::poll::{PollGame, PollQuestion, PollResult};
use crate::tile_sort::{RoundResult, TileSortFinal, TileSortGame, TileSortStart};

/// Which mini-game is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameKind {
    Poll,
    TileSort,
}

impl GameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::TileSort => "tile-sort",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one game instance. Deadlines carry it so that a deadline
/// outliving its game is recognised and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    pub fn generate() -> Self {
        Self(random_id())
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a game deadline: the game and, for tile-sort, the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineKey {
    pub game: GameId,
    pub round: u8,
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// The room's active game.
///
/// Serialized as `{"activeGame": <kind | null>, "gameData": <data | null>}`
/// so a client can test `activeGame` for truthiness.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GameState {
    #[default]
    None,
    Poll(PollGame),
    TileSort(TileSortGame),
}

impl GameState {
    /// The running game's kind, if any.
    pub fn kind(&self) -> Option<GameKind> {
        match self {
            Self::None => None,
            Self::Poll(_) => Some(GameKind::Poll),
            Self::TileSort(_) => Some(GameKind::TileSort),
        }
    }

    /// The running game's id, if any.
    pub fn id(&self) -> Option<&GameId> {
        match self {
            Self::None => None,
            Self::Poll(poll) => Some(&poll.id),
            Self::TileSort(game) => Some(&game.id),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Serialize for GameState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("GameState", 2)?;
        state.serialize_field("activeGame", &self.kind())?;
        match self {
            Self::None => state.serialize_field("gameData", &Option::<()>::None)?,
            Self::Poll(poll) => state.serialize_field("gameData", poll)?,
            Self::TileSort(game) => state.serialize_field("gameData", game)?,
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for GameState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Repr {
            active_game: Option<GameKind>,
            #[serde(default)]
            game_data: serde_json::Value,
        }

        let repr = Repr::deserialize(deserializer)?;
        match repr.active_game {
            None => Ok(Self::None),
            Some(GameKind::Poll) => serde_json::from_value(repr.game_data)
                .map(Self::Poll)
                .map_err(D::Error::custom),
            Some(GameKind::TileSort) => serde_json::from_value(repr.game_data)
                .map(Self::TileSort)
                .map_err(D::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// Game announcements
// ---------------------------------------------------------------------------

/// Payload of a `game-event` message:
/// `{"gameType": "...", "action": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEventPayload {
    pub game_type: GameKind,
    #[serde(flatten)]
    pub event: GameEvent,
}

impl From<GameEvent> for GameEventPayload {
    fn from(event: GameEvent) -> Self {
        let game_type = match &event {
            GameEvent::Question(_) | GameEvent::Result(_) => GameKind::Poll,
            GameEvent::Start(_) | GameEvent::RoundEnd(_) | GameEvent::Final(_) => {
                GameKind::TileSort
            }
        };
        Self { game_type, event }
    }
}

/// What happened in a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum GameEvent {
    /// A poll opened.
    Question(PollQuestion),
    /// A poll closed with final tallies.
    Result(PollResult),
    /// A tile-sort game started.
    Start(TileSortStart),
    /// A tile-sort round closed and another follows.
    RoundEnd(RoundResult),
    /// The last tile-sort round closed.
    Final(TileSortFinal),
}
