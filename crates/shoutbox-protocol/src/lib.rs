//! Wire protocol for Shoutbox.
//!
//! This crate defines what clients may send and how frames are encoded:
//!
//! - **Events** ([`ClientEvent`] and its payloads): inbound requests.
//! - **Identifiers** ([`UserId`], [`RoomCode`]) and [`ErrorCode`].
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): frame (de)serialization.
//!
//! Outbound events carry room snapshots, so they are defined next to the
//! room model in the server crate rather than here.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientEvent) → Handler → Room actor
//! ```

mod codec;
mod error;
mod event;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use event::{
    ClientEvent, CustomRounds, GameAction, JoinRoom, PollSetup, ResultReport, SendMessage,
    SetName, StartGame, TileSortSetup, Vote,
};
pub use types::{ErrorCode, RoomCode, UserId};
