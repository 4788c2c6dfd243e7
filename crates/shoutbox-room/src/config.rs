//! Room configuration.

use std::time::Duration;

/// Limits and timings applied to every room.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Maximum participant records per room, online or not.
    pub max_participants: usize,

    /// Messages kept in each room's history. Older ones are dropped.
    pub history_limit: usize,

    /// Maximum chat message length in characters.
    pub max_message_len: usize,

    /// Sliding expiry of the persisted snapshot, refreshed on every mutation.
    pub snapshot_ttl: Duration,

    /// Room code draws before giving up on `create_room`.
    pub code_attempts: usize,

    /// How long a room actor with no subscribers and no pending deadlines
    /// stays alive before persisting and stopping.
    pub idle_timeout: Duration,

    /// Capacity of each room actor's command channel.
    pub channel_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_participants: 8,
            history_limit: 250,
            max_message_len: 500,
            snapshot_ttl: Duration::from_secs(24 * 60 * 60),
            code_attempts: 10,
            idle_timeout: Duration::from_secs(5 * 60),
            channel_size: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.max_participants, 8);
        assert_eq!(config.history_limit, 250);
        assert_eq!(config.max_message_len, 500);
        assert_eq!(config.snapshot_ttl, Duration::from_secs(86_400));
        assert_eq!(config.code_attempts, 10);
    }
}
