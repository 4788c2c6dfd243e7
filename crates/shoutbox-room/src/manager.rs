//! Room manager: creates rooms, tracks their actors, and revives rooms
//! from the store.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use shoutbox_protocol::RoomCode;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::model::{Participant, now_ms};
use crate::room::spawn_room;
use crate::store::{KeyValueStore, MemoryStore, RoomStore};
use crate::{Member, Room, RoomConfig, RoomError, RoomHandle};

/// Draws a room code uniformly from `[A-Z0-9]{6}`.
pub fn random_room_code() -> RoomCode {
    let mut rng = rand::rng();
    RoomCode::from_indices(std::array::from_fn(|_| {
        rng.random_range(0..RoomCode::ALPHABET.len())
    }))
}

type CodeGenerator = Box<dyn Fn() -> RoomCode + Send + Sync>;

/// A live room actor.
struct RoomEntry {
    handle: RoomHandle,
    /// Awaited before a replacement actor is spawned, so the stopped
    /// actor's final snapshot is written first.
    task: JoinHandle<()>,
}

/// Owns the registry of live rooms.
///
/// All methods take `&self`; share it behind an `Arc`. The registry lock
/// is held only while looking up, creating or reviving an actor, never
/// while a room processes a command.
pub struct RoomManager<S = MemoryStore> {
    rooms: Mutex<HashMap<RoomCode, RoomEntry>>,
    store: RoomStore<S>,
    config: RoomConfig,
    codes: CodeGenerator,
}

impl<S> fmt::Debug for RoomManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStore> RoomManager<S> {
    /// Creates a manager persisting snapshots to `store`.
    pub fn new(config: RoomConfig, store: S) -> Self {
        let store = RoomStore::new(store, config.snapshot_ttl);
        Self {
            rooms: Mutex::new(HashMap::new()),
            store,
            config,
            codes: Box::new(random_room_code),
        }
    }

    /// Replaces the room code source.
    pub fn with_code_generator(
        mut self,
        codes: impl Fn() -> RoomCode + Send + Sync + 'static,
    ) -> Self {
        self.codes = Box::new(codes);
        self
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn store(&self) -> &RoomStore<S> {
        &self.store
    }

    /// Creates a room owned by `owner` and joins them to it.
    ///
    /// The snapshot is persisted before the actor starts; if that fails no
    /// room is created.
    ///
    /// # Errors
    /// [`RoomError::CodeGenerationExhausted`] if every drawn code is taken,
    /// [`RoomError::Store`] if the store fails.
    pub async fn create_room(&self, owner: Member) -> Result<RoomHandle, RoomError> {
        let mut rooms = self.rooms.lock().await;
        let code = self.free_code(&rooms).await?;

        let founder = Participant::new(owner.user_id.clone(), &owner.display_name, now_ms());
        let room = Room::new(code.clone(), founder, self.config.history_limit);
        self.store.save(&room).await?;

        let (handle, task) = spawn_room(room, self.config.clone(), self.store.clone());
        rooms.insert(
            code.clone(),
            RoomEntry {
                handle: handle.clone(),
                task,
            },
        );
        drop(rooms);

        tracing::info!(room_code = %code, owner = %owner.user_id, "room created");
        handle.join(owner).await?;
        Ok(handle)
    }

    /// Joins `member` to the room `code`, reviving it from the store if
    /// its actor is not running.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if the room is neither live nor stored, plus
    /// any rejection from the room itself.
    pub async fn join_room(&self, code: &RoomCode, member: Member) -> Result<RoomHandle, RoomError> {
        let handle = self.room(code).await?;
        match handle.join(member.clone()).await {
            Ok(()) => Ok(handle),
            // The actor stopped between lookup and join; it is closed now,
            // so the next lookup revives the room.
            Err(RoomError::Unavailable(_)) => {
                let handle = self.room(code).await?;
                handle.join(member).await?;
                Ok(handle)
            }
            Err(err) => Err(err),
        }
    }

    /// Returns a handle to the live actor for `code`, reviving the room
    /// from its snapshot if needed.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if there is no snapshot,
    /// [`RoomError::Store`] if loading it fails.
    pub async fn room(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        let mut rooms = self.rooms.lock().await;
        if let Some(entry) = rooms.get(code) {
            if !entry.handle.is_closed() {
                return Ok(entry.handle.clone());
            }
        }

        if let Some(stale) = rooms.remove(code) {
            let _ = stale.task.await;
        }
        let room = self
            .store
            .load(code)
            .await?
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;

        let (handle, task) = spawn_room(room, self.config.clone(), self.store.clone());
        rooms.insert(
            code.clone(),
            RoomEntry {
                handle: handle.clone(),
                task,
            },
        );
        tracing::info!(room_code = %code, "room revived from store");
        Ok(handle)
    }

    /// A copy of a room's current state.
    pub async fn snapshot(&self, code: &RoomCode) -> Result<Room, RoomError> {
        self.room(code).await?.snapshot().await
    }

    /// Number of registered room actors, including stopped ones not yet
    /// replaced.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Codes of rooms whose actor is running.
    pub async fn live_rooms(&self) -> Vec<RoomCode> {
        self.rooms
            .lock()
            .await
            .iter()
            .filter(|(_, entry)| !entry.handle.is_closed())
            .map(|(code, _)| code.clone())
            .collect()
    }

    /// Stops every actor and waits for their final snapshots.
    pub async fn shutdown(&self) {
        let entries: Vec<RoomEntry> = self.rooms.lock().await.drain().map(|(_, e)| e).collect();
        for RoomEntry { handle, task } in entries {
            handle.stop().await;
            let _ = task.await;
        }
        tracing::info!("room manager shut down");
    }

    async fn free_code(&self, rooms: &HashMap<RoomCode, RoomEntry>) -> Result<RoomCode, RoomError> {
        for attempt in 1..=self.config.code_attempts {
            let code = (self.codes)();
            if rooms.contains_key(&code) || self.store.exists(&code).await? {
                tracing::debug!(room_code = %code, attempt, "room code collision");
                continue;
            }
            return Ok(code);
        }
        tracing::warn!(attempts = self.config.code_attempts, "no free room code");
        Err(RoomError::CodeGenerationExhausted(self.config.code_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_room_code_shape() {
        for _ in 0..100 {
            let code = random_room_code();
            assert_eq!(code.as_str().len(), 6);
            assert!(code
                .as_str()
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }
}
