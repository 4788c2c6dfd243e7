//! Per-connection handler: session, room membership, and event routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Spawn a writer task that owns all outbound frames
//!   2. Loop: receive a frame → decode a `ClientEvent` → apply it
//!   3. On exit, the guard detaches the connection from its room and ends
//!      its session
//!
//! Rejections never close the connection; they are answered with an
//! `error` event to this connection only.

use std::sync::Arc;

use shoutbox_protocol::{ClientEvent, Codec, ErrorCode, JoinRoom, RoomCode, SetName, UserId};
use shoutbox_room::{EventSender, KeyValueStore, Member, Room, RoomEvent, RoomHandle};
use shoutbox_session::{RateKey, Session, SessionError};
use shoutbox_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::{ServerEvent, ShoutboxError};

/// Everything the server knows about one connection.
///
/// Dropping it detaches the connection from its room (without a
/// `user_left` notice) and ends its session. Since `Drop` is synchronous,
/// that cleanup runs in a fire-and-forget task.
struct ConnectionGuard<S: KeyValueStore, C: Codec> {
    conn: ConnectionId,
    state: Arc<ServerState<S, C>>,
    /// Handed to room actors as this connection's subscription.
    events: EventSender,
    /// Direct replies, written after any room events already queued.
    replies: mpsc::UnboundedSender<ServerEvent>,
    session: Option<Session>,
    room: Option<RoomHandle>,
}

impl<S: KeyValueStore, C: Codec> Drop for ConnectionGuard<S, C> {
    fn drop(&mut self) {
        let conn = self.conn;
        let room = self.room.take();
        let token = self.session.take().map(|s| s.token);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            if let Some(room) = room {
                let _ = room.disconnect(conn).await;
            }
            if let Some(token) = token {
                state.sessions.lock().await.end(&token);
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, C>>,
) -> Result<(), ShoutboxError>
where
    S: KeyValueStore,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = ?conn.peer_addr(), "handling new connection");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (replies_tx, replies_rx) = mpsc::unbounded_channel();
    tokio::spawn(write_frames(
        Arc::clone(&conn),
        Arc::clone(&state),
        events_rx,
        replies_rx,
    ));

    let mut guard = ConnectionGuard {
        conn: conn_id,
        state: Arc::clone(&state),
        events: events_tx,
        replies: replies_tx,
        session: None,
        room: None,
    };

    loop {
        // Reads never time out; a participant may only listen.
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let event: ClientEvent = match state.codec.decode(&data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode event");
                let code = ClientEvent::decode_error_code(&state.codec, &data);
                guard.reply(ServerEvent::error(code));
                continue;
            }
        };

        if let Err(err) = guard.handle(event).await {
            let code = err.code();
            if code == ErrorCode::ServerError {
                tracing::error!(%conn_id, error = %err, "request failed");
            } else {
                tracing::debug!(%conn_id, %code, error = %err, "request rejected");
            }
            guard.reply(ServerEvent::rejected(&err));
        }
    }

    // guard drops here → room disconnect and session end fire.
    Ok(())
}

/// Writes every outbound frame for one connection.
///
/// Room events are preferred over direct replies, so a reply sent after a
/// room call returns follows the events that call produced.
async fn write_frames<S: KeyValueStore, C: Codec>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<S, C>>,
    mut events: mpsc::UnboundedReceiver<RoomEvent>,
    mut replies: mpsc::UnboundedReceiver<ServerEvent>,
) {
    let conn_id = conn.id();
    loop {
        let event = tokio::select! {
            biased;
            Some(event) = events.recv() => ServerEvent::from(event),
            Some(event) = replies.recv() => event,
            else => break,
        };

        let bytes = match state.codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%conn_id, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, stopping writer");
            break;
        }
    }
}

impl<S: KeyValueStore, C: Codec> ConnectionGuard<S, C> {
    async fn handle(&mut self, event: ClientEvent) -> Result<(), ShoutboxError> {
        match event {
            ClientEvent::SetName(req) => self.set_name(req).await,
            ClientEvent::CreateRoom => self.create_room().await,
            ClientEvent::JoinRoom(req) => self.join_room(req).await,
            ClientEvent::SendMessage(req) => self.send_message(&req.text).await,
            ClientEvent::LeaveRoom => self.leave_room().await,
            ClientEvent::StartGame(setup) => {
                self.current_room()?.start_game(self.conn, setup).await?;
                Ok(())
            }
            ClientEvent::GameAction(action) => {
                self.current_room()?.game_action(self.conn, action).await?;
                Ok(())
            }
        }
    }

    fn reply(&self, event: ServerEvent) {
        // Fails only once the writer has stopped; the loop ends next recv.
        let _ = self.replies.send(event);
    }

    async fn set_name(&mut self, req: SetName) -> Result<(), ShoutboxError> {
        let previous = self.session.as_ref().map(|s| s.token.as_str());
        let session = self.state.sessions.lock().await.replace(
            previous,
            &req.display_name,
            req.local_id.as_deref(),
        )?;

        self.reply(ServerEvent::SessionCreated {
            session_token: session.token.clone(),
            user_id: session.user_id.clone(),
        });
        self.session = Some(session);
        Ok(())
    }

    async fn create_room(&mut self) -> Result<(), ShoutboxError> {
        let member = self.member().await?;
        self.leave_current().await;
        let handle = self.state.rooms.create_room(member).await?;
        self.room = Some(handle);
        Ok(())
    }

    async fn join_room(&mut self, req: JoinRoom) -> Result<(), ShoutboxError> {
        let member = self.member().await?;
        let code = RoomCode::parse(&req.room_code)
            .map_err(|_| ShoutboxError::Rejected(ErrorCode::InvalidRoomCode))?;

        if self.room.as_ref().is_some_and(|r| *r.room_code() != code) {
            self.leave_current().await;
        }
        let handle = self.state.rooms.join_room(&code, member).await?;
        self.room = Some(handle);
        Ok(())
    }

    async fn send_message(&self, text: &str) -> Result<(), ShoutboxError> {
        let room = self.current_room()?;
        let user = self.user_id()?;
        let text = Room::validate_chat_text(text, self.state.config.room.max_message_len)?;

        let key = RateKey::chat(user.clone());
        if !self.state.limiter.check(&key, self.state.config.chat_limit) {
            return Err(SessionError::RateLimited(RateKey::CHAT).into());
        }
        room.post_message(self.conn, text).await?;
        Ok(())
    }

    /// Replies `room_left` only once the room has recorded the departure.
    /// The connection is detached from the room either way.
    async fn leave_room(&mut self) -> Result<(), ShoutboxError> {
        let room = self
            .room
            .take()
            .ok_or(ShoutboxError::Rejected(ErrorCode::NotInRoom))?;
        if let Err(error) = room.leave(self.conn).await {
            tracing::warn!(conn_id = %self.conn, room_code = %room.room_code(), %error, "leave failed");
            return Err(error.into());
        }
        self.reply(ServerEvent::RoomLeft {
            room_code: room.room_code().clone(),
        });
        Ok(())
    }

    /// Leaves the current room, if any, ahead of creating or joining
    /// another one.
    async fn leave_current(&mut self) {
        if let Some(room) = self.room.take() {
            if let Err(error) = room.leave(self.conn).await {
                tracing::warn!(conn_id = %self.conn, room_code = %room.room_code(), %error, "implicit leave failed");
            }
        }
    }

    fn current_room(&self) -> Result<&RoomHandle, ShoutboxError> {
        self.room
            .as_ref()
            .ok_or(ShoutboxError::Rejected(ErrorCode::NotInRoom))
    }

    fn user_id(&self) -> Result<&UserId, ShoutboxError> {
        self.session
            .as_ref()
            .map(|s| &s.user_id)
            .ok_or(ShoutboxError::Rejected(ErrorCode::NotAuthenticated))
    }

    /// This connection as a room member. The session must still be live
    /// in the registry.
    async fn member(&self) -> Result<Member, ShoutboxError> {
        let Some(session) = &self.session else {
            return Err(ShoutboxError::Rejected(ErrorCode::NotAuthenticated));
        };
        let sessions = self.state.sessions.lock().await;
        let session = sessions.resolve(&session.token)?;
        Ok(Member {
            conn: self.conn,
            user_id: session.user_id.clone(),
            display_name: session.display_name.to_string(),
            events: self.events.clone(),
        })
    }
}
