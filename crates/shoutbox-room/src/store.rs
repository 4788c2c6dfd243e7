//! Persistence of room snapshots in an expiring key-value store.
//!
//! The store is write-through only: the room actor owns the live state and
//! saves a snapshot after every mutation. Snapshots are read back only to
//! bring a room that has no running actor back to life.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shoutbox_protocol::RoomCode;
use tokio::time::Instant;

use crate::{Room, StoreError};

/// An external key-value service with get / set-with-expiry semantics.
///
/// Methods return `Send` futures so they can be awaited inside spawned
/// room actors.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Reads `key`. Expired keys read as `None`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Writes `key`, replacing any value and resetting its expiry to `ttl`.
    fn set_ex(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns `true` if `key` holds an unexpired value.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Drops expired keys and returns how many went. Backends that expire
    /// keys themselves keep the default.
    fn sweep(&self) -> usize {
        0
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process [`KeyValueStore`]. Cheap to clone; clones share data.
///
/// Expiry is lazy: an expired key is dropped when next read, or by
/// [`MemoryStore::purge_expired`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, "expired store keys removed");
        }
        purged
    }

    /// Number of keys held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, expires)) if *expires > now => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read(key))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read(key).is_some())
    }

    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

// ---------------------------------------------------------------------------
// RoomStore
// ---------------------------------------------------------------------------

/// Typed access to room snapshots, stored as JSON under `room:{CODE}`.
#[derive(Debug)]
pub struct RoomStore<S> {
    backend: Arc<S>,
    ttl: Duration,
}

impl<S> Clone for RoomStore<S> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            ttl: self.ttl,
        }
    }
}

impl<S: KeyValueStore> RoomStore<S> {
    /// Wraps `backend`; every save refreshes the key's expiry to `ttl`.
    pub fn new(backend: S, ttl: Duration) -> Self {
        Self {
            backend: Arc::new(backend),
            ttl,
        }
    }

    /// The key a room is stored under.
    pub fn key(code: &RoomCode) -> String {
        format!("room:{code}")
    }

    /// The underlying key-value store.
    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Loads a snapshot.
    ///
    /// # Errors
    /// [`StoreError::Backend`] from the store, or
    /// [`StoreError::Serialization`] if the stored JSON is not a room.
    pub async fn load(&self, code: &RoomCode) -> Result<Option<Room>, StoreError> {
        match self.backend.get(&Self::key(code)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Saves a snapshot and refreshes its expiry.
    ///
    /// # Errors
    /// [`StoreError`] if encoding or the write fails.
    pub async fn save(&self, room: &Room) -> Result<(), StoreError> {
        let json = serde_json::to_string(room)?;
        self.backend
            .set_ex(&Self::key(&room.room_code), json, self.ttl)
            .await
    }

    /// Returns `true` if a snapshot exists for `code`.
    ///
    /// # Errors
    /// [`StoreError::Backend`] from the store.
    pub async fn exists(&self, code: &RoomCode) -> Result<bool, StoreError> {
        self.backend.exists(&Self::key(code)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Participant;
    use shoutbox_protocol::UserId;

    #[tokio::test(start_paused = true)]
    async fn test_memory_store_expires_after_ttl() {
        let store = MemoryStore::new();
        store.set_ex("k", "v".into(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(!store.exists("k").await.unwrap());
        assert!(store.is_empty(), "expired key dropped on read");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_ex_refreshes_expiry() {
        let store = MemoryStore::new();
        store.set_ex("k", "v1".into(), Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        store.set_ex("k", "v2".into(), Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_removes_only_expired() {
        let store = MemoryStore::new();
        store.set_ex("short", "v".into(), Duration::from_secs(1)).await.unwrap();
        store.set_ex("long", "v".into(), Duration::from_secs(100)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_room_store_round_trips_snapshot() {
        let store = RoomStore::new(MemoryStore::new(), Duration::from_secs(60));
        let code = RoomCode::parse("ROOM01").unwrap();
        let room = Room::new(code.clone(), Participant::new(UserId::from("u1"), "alice", 7), 250);

        assert!(store.load(&code).await.unwrap().is_none());
        store.save(&room).await.unwrap();

        assert!(store.exists(&code).await.unwrap());
        assert!(store.backend().exists("room:ROOM01").await.unwrap());
        assert_eq!(store.load(&code).await.unwrap(), Some(room));
    }

    #[tokio::test]
    async fn test_room_store_rejects_corrupt_snapshot() {
        let backend = MemoryStore::new();
        backend
            .set_ex("room:BAD000", "{not json".into(), Duration::from_secs(60))
            .await
            .unwrap();
        let store = RoomStore::new(backend, Duration::from_secs(60));

        let result = store.load(&RoomCode::parse("BAD000").unwrap()).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
