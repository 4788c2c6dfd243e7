//! Rooms for Shoutbox.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! participants, message history and active game. Snapshots are written
//! through to a [`KeyValueStore`] after every mutation so a room can be
//! revived after its actor stops.
//!
//! # Key types
//!
//! - [`RoomManager`]: creates rooms, routes joins, revives stored rooms
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomEvent`]: what an actor delivers to subscribed connections
//! - [`Room`]: the room state clients see and the store persists
//! - [`GameState`]: the active poll or tile-sort game, if any

mod config;
mod error;
mod game;
mod log;
mod manager;
mod model;
pub mod poll;
mod room;
mod store;
pub mod tile_sort;

pub use config::RoomConfig;
pub use error::{RoomError, StoreError};
pub use game::{GameEvent, GameEventPayload, GameId, GameKind, GameState};
pub use log::{DEFAULT_HISTORY_LIMIT, MessageLog};
pub use manager::{RoomManager, random_room_code};
pub use model::{ChatPayload, Message, MessageBody, Millis, Participant, Room, SystemEvent, now_ms};
pub use poll::PollGame;
pub use room::{EventSender, Member, RoomEvent, RoomHandle};
pub use store::{KeyValueStore, MemoryStore, RoomStore};
pub use tile_sort::TileSortGame;
