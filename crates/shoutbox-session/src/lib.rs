//! Participant sessions for Shoutbox.
//!
//! This crate knows who is on the other end of a connection:
//!
//! 1. **Names**: [`DisplayName`] validates the self-asserted name a
//!    participant picks.
//! 2. **Sessions**: [`SessionManager`] issues a token and a stable
//!    [`UserId`](shoutbox_protocol::UserId) on `set_name`.
//! 3. **Rate limiting**: [`RateLimiter`] keeps a sliding window of recent
//!    actions per participant.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← tags messages and participants with session identity
//!     ↕
//! Session Layer (this crate)  ← who is connected, how fast they may talk
//!     ↕
//! Protocol Layer (below)  ← provides UserId, ErrorCode
//! ```

mod error;
mod manager;
mod rate_limit;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use rate_limit::{RateKey, RateLimitConfig, RateLimiter};
pub use session::{DisplayName, ID_LEN, Session, random_id};
