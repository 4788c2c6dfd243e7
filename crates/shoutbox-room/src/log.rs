//! Bounded message history.

use std::collections::VecDeque;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Message;

/// Messages kept when a log is built without an explicit limit, for
/// example when a snapshot is decoded.
pub const DEFAULT_HISTORY_LIMIT: usize = 250;

/// Append-only message history that keeps the most recent `limit`
/// entries. Insertion order is causal order.
///
/// Serializes as a plain JSON array.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageLog {
    entries: VecDeque<Message>,
    limit: usize,
}

impl MessageLog {
    /// An empty log holding at most `limit` messages.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Appends `message`, dropping the oldest entries beyond the limit.
    pub fn push(&mut self, message: Message) {
        self.entries.push_back(message);
        self.truncate();
    }

    /// Removes the message with `id`. Returns it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let idx = self.entries.iter().position(|m| m.id == id)?;
        self.entries.remove(idx)
    }

    /// Changes the limit, dropping the oldest entries if needed.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
        self.truncate();
    }

    /// The configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Messages oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.entries.iter()
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn truncate(&mut self) {
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl Serialize for MessageLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.entries)
    }
}

impl<'de> Deserialize<'de> for MessageLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let messages = Vec::<Message>::deserialize(deserializer)?;
        let mut log = Self::default();
        for message in messages {
            log.push(message);
        }
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, SystemEvent};

    fn msg(n: usize) -> Message {
        Message::system(
            SystemEvent::UserJoined {
                user_name: format!("user{n}"),
            },
            n as u64,
        )
    }

    #[test]
    fn test_push_beyond_limit_drops_oldest() {
        let mut log = MessageLog::new(250);
        for n in 0..300 {
            log.push(msg(n));
        }
        assert_eq!(log.len(), 250);
        assert_eq!(log.iter().next().unwrap().timestamp, 50);
        assert_eq!(log.last().unwrap().timestamp, 299);

        let stamps: Vec<u64> = log.iter().map(|m| m.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]), "order preserved");
    }

    #[test]
    fn test_remove_by_id() {
        let mut log = MessageLog::new(10);
        let keep = msg(1);
        let drop = msg(2);
        let drop_id = drop.id.clone();
        log.push(keep.clone());
        log.push(drop);

        assert!(log.remove(&drop_id).is_some());
        assert!(log.remove(&drop_id).is_none());
        assert_eq!(log.len(), 1);
        assert_eq!(log.last(), Some(&keep));
    }

    #[test]
    fn test_set_limit_truncates() {
        let mut log = MessageLog::new(10);
        for n in 0..10 {
            log.push(msg(n));
        }
        log.set_limit(3);
        assert_eq!(log.len(), 3);
        assert_eq!(log.iter().next().unwrap().timestamp, 7);
    }

    #[test]
    fn test_serializes_as_array() {
        let mut log = MessageLog::new(10);
        log.push(msg(1));
        let json = serde_json::to_value(&log).unwrap();
        assert!(json.is_array());
        let back: MessageLog = serde_json::from_value(json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.limit(), DEFAULT_HISTORY_LIMIT);
    }
}
