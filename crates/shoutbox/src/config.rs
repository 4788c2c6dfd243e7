//! Server configuration.

use std::time::Duration;

use shoutbox_room::RoomConfig;
use shoutbox_session::RateLimitConfig;

use crate::ShoutboxError;

/// Everything a [`ShoutboxServer`](crate::ShoutboxServer) needs to run.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind: String,

    /// Limits and timings applied to every room.
    pub room: RoomConfig,

    /// Chat messages allowed per participant per window.
    pub chat_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            room: RoomConfig::default(),
            chat_limit: RateLimitConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `SHOUTBOX_*` environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `SHOUTBOX_BIND` | `bind` |
    /// | `SHOUTBOX_ROOM_TTL_SECS` | `room.snapshot_ttl` |
    /// | `SHOUTBOX_CHAT_LIMIT` | `chat_limit.limit` |
    ///
    /// # Errors
    /// [`ShoutboxError::Config`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ShoutboxError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ShoutboxError> {
        let mut config = Self::default();
        if let Some(bind) = lookup("SHOUTBOX_BIND") {
            config.bind = bind;
        }
        if let Some(secs) = parse_var(&lookup, "SHOUTBOX_ROOM_TTL_SECS")? {
            config.room.snapshot_ttl = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_var(&lookup, "SHOUTBOX_CHAT_LIMIT")? {
            config.chat_limit.limit = limit;
        }
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ShoutboxError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ShoutboxError::Config(format!("{key}={raw:?} is not a valid number"))),
    }
}
