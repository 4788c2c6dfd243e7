//! # Shoutbox
//!
//! Real-time chat rooms with owner-run mini-games.
//!
//! Participants pick a display name, create or join a room by its
//! six-character code, chat, and play polls or tile-sort races together.
//! Each room is owned by a single actor task, so every change to a room is
//! applied in order and broadcast to everyone in it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shoutbox::prelude::*;
//!
//! # async fn start() -> Result<(), ShoutboxError> {
//! let server = ShoutboxServer::builder()
//!     .config(ServerConfig::from_env()?)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod event;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::ShoutboxError;
pub use event::ServerEvent;
pub use server::{ShoutboxServer, ShoutboxServerBuilder};

/// Re-exports the types needed to run and talk to a server.
pub mod prelude {
    pub use crate::{ServerConfig, ServerEvent, ShoutboxError, ShoutboxServer, ShoutboxServerBuilder};

    pub use shoutbox_protocol::{
        ClientEvent, Codec, CustomRounds, ErrorCode, GameAction, JoinRoom, JsonCodec, PollSetup,
        ResultReport, RoomCode, SendMessage, SetName, StartGame, TileSortSetup, UserId, Vote,
    };
    pub use shoutbox_room::{
        GameEvent, GameKind, GameState, KeyValueStore, MemoryStore, Message, MessageBody,
        Participant, Room, RoomConfig, StoreError, SystemEvent,
    };
    pub use shoutbox_session::RateLimitConfig;
}
