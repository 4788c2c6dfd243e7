//! Session types: display names, sessions, and random identifiers.

use std::fmt;

use rand::Rng;
use shoutbox_protocol::UserId;

use crate::SessionError;

// ---------------------------------------------------------------------------
// DisplayName
// ---------------------------------------------------------------------------

/// A validated participant display name.
///
/// 2 to 20 characters, each an ASCII letter, digit, `_` or `-`. Names are
/// compared case-insensitively inside a room (see [`DisplayName::same_as`]),
/// but the original spelling is kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayName(String);

impl DisplayName {
    /// Shortest accepted name.
    pub const MIN_LEN: usize = 2;
    /// Longest accepted name.
    pub const MAX_LEN: usize = 20;

    /// Validates a client-supplied name.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidName`] if the name breaks the rules
    /// above. No trimming is applied: `" bob"` is rejected.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let len = raw.len();
        let valid_chars = raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&len) || !valid_chars {
            return Err(SessionError::InvalidName(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Case-insensitive comparison used for name uniqueness in a room.
    pub fn same_as(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the name, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The server's record of a named participant.
///
/// Created by `set_name`. A connection holds at most one session; naming
/// again replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque secret identifying this session. 32 hex characters.
    pub token: String,

    /// Stable identity. Taken from the client's `localId` when supplied so
    /// a returning browser reclaims its seat in a room.
    pub user_id: UserId,

    /// The validated display name.
    pub display_name: DisplayName,
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

const URL_SAFE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Length of ids produced by [`random_id`].
pub const ID_LEN: usize = 21;

/// Generates a 21-character URL-safe random identifier.
///
/// Used for message ids and for user ids when the client does not supply
/// one.
pub fn random_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LEN)
        .map(|_| URL_SAFE[rng.random_range(0..URL_SAFE.len())] as char)
        .collect()
}

/// Generates a random 32-character hex string (128 bits of entropy).
pub(crate) fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
