//! The session manager: the registry of named participants.
//!
//! `SessionManager` is not thread-safe by itself; it uses a plain
//! `HashMap`. The server wraps it in a mutex and holds the lock only for
//! the duration of a single call.

use std::collections::HashMap;

use shoutbox_protocol::UserId;

use crate::session::generate_token;
use crate::{DisplayName, Session, SessionError, random_id};

/// Tracks every live session by token.
///
/// ```text
/// set_name ──→ register() ──→ [Session]
///                               │
///              set_name again ──┤── replace()  (old token invalidated)
///                               │
///              disconnect ──────┴── end()
/// ```
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<String, Session>,
}

impl SessionManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `display_name` and creates a new session.
    ///
    /// `local_id` is the identity a returning client kept from an earlier
    /// visit; when absent or blank a fresh id is generated.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidName`] if the name is not acceptable.
    pub fn register(
        &mut self,
        display_name: &str,
        local_id: Option<&str>,
    ) -> Result<Session, SessionError> {
        let display_name = DisplayName::parse(display_name)?;
        let user_id = match local_id.map(str::trim) {
            Some(id) if !id.is_empty() => UserId(id.to_string()),
            _ => UserId(random_id()),
        };

        let session = Session {
            token: generate_token(),
            user_id,
            display_name,
        };
        self.sessions.insert(session.token.clone(), session.clone());

        tracing::info!(
            user_id = %session.user_id,
            display_name = %session.display_name,
            "session created"
        );
        Ok(session)
    }

    /// Registers a new session and ends `previous`, if given.
    ///
    /// The old session is only ended once the new one is accepted: an
    /// invalid name leaves the caller's current session untouched.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidName`] if the name is not acceptable.
    pub fn replace(
        &mut self,
        previous: Option<&str>,
        display_name: &str,
        local_id: Option<&str>,
    ) -> Result<Session, SessionError> {
        let session = self.register(display_name, local_id)?;
        if let Some(token) = previous {
            self.end(token);
        }
        Ok(session)
    }

    /// Looks up a session by token.
    ///
    /// # Errors
    /// Returns [`SessionError::UnknownToken`] if no session has this token.
    pub fn resolve(&self, token: &str) -> Result<&Session, SessionError> {
        self.sessions.get(token).ok_or(SessionError::UnknownToken)
    }

    /// Ends a session. Returns the removed session, if it existed.
    pub fn end(&mut self, token: &str) -> Option<Session> {
        let removed = self.sessions.remove(token);
        if let Some(session) = &removed {
            tracing::debug!(user_id = %session.user_id, "session ended");
        }
        removed
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
