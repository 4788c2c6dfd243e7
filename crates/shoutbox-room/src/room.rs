//! Room actor: an isolated Tokio task that owns one room.
//!
//! Every mutation arrives as a command on the actor's channel and is
//! applied to the actor-owned [`Room`] one at a time. Game deadlines live
//! in the same loop, so a poll closing by itself is ordered with votes
//! arriving at the same moment. After each accepted command the actor
//! saves a snapshot, then broadcasts the resulting events.

use std::collections::BTreeMap;
use std::time::Duration;

use shoutbox_protocol::{GameAction, RoomCode, StartGame, UserId};
use shoutbox_timer::DeadlineScheduler;
use shoutbox_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::game::{DeadlineKey, GameId, GameKind, GameState};
use crate::model::{Message, Millis, Participant, SystemEvent, now_ms};
use crate::poll::PollGame;
use crate::store::{KeyValueStore, RoomStore};
use crate::tile_sort::{RoundClose, TileSortGame};
use crate::{Room, RoomConfig, RoomError};

/// An event the room actor delivers to a subscribed connection.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Full snapshot, sent only to the connection that just joined.
    Joined(Box<Room>),
    /// A message was appended to the history.
    NewMessage(Message),
    /// The participant list changed.
    ParticipantUpdate(Vec<Participant>),
    /// The active game changed.
    GameUpdate(GameState),
    /// A message was removed from the history.
    MessageRemoved(String),
}

/// Channel sender for delivering room events to one connection.
pub type EventSender = mpsc::UnboundedSender<RoomEvent>;

/// A connection asking to join a room as a participant.
#[derive(Debug, Clone)]
pub struct Member {
    pub conn: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
    pub events: EventSender,
}

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join { member: Member, reply: Reply<()> },
    Leave { conn: ConnectionId, reply: Reply<()> },
    Disconnect { conn: ConnectionId },
    PostMessage { conn: ConnectionId, text: String, reply: Reply<()> },
    StartGame { conn: ConnectionId, setup: StartGame, reply: Reply<()> },
    GameAction { conn: ConnectionId, action: GameAction, reply: Reply<()> },
    Snapshot { reply: Reply<Room> },
    Stop,
}

/// Handle to a running room actor.
///
/// Cheap to clone; it wraps an `mpsc::Sender`.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// The code of the room this handle talks to.
    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    /// Returns `true` once the actor has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Subscribes `member` and adds or re-activates its participant record.
    ///
    /// On success the member's channel receives [`RoomEvent::Joined`]
    /// before any later broadcast.
    pub async fn join(&self, member: Member) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Join { member, reply }).await
    }

    /// Unsubscribes `conn`, marks its participant offline and announces it.
    pub async fn leave(&self, conn: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { conn, reply }).await
    }

    /// Unsubscribes `conn` after its connection dropped (fire-and-forget).
    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Disconnect { conn })
            .await
            .map_err(|_| self.unavailable())
    }

    /// Posts a chat message on behalf of `conn`.
    pub async fn post_message(&self, conn: ConnectionId, text: String) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::PostMessage { conn, text, reply }).await
    }

    /// Starts a game on behalf of `conn`.
    pub async fn start_game(&self, conn: ConnectionId, setup: StartGame) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::StartGame { conn, setup, reply }).await
    }

    /// Applies a game action on behalf of `conn`.
    pub async fn game_action(&self, conn: ConnectionId, action: GameAction) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::GameAction { conn, action, reply }).await
    }

    /// A copy of the current room state.
    pub async fn snapshot(&self) -> Result<Room, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    /// Asks the actor to persist and stop. Commands already queued behind
    /// this one are refused with [`RoomError::Unavailable`].
    pub(crate) async fn stop(&self) {
        let _ = self.sender.send(RoomCommand::Stop).await;
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())?
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.room_code.clone())
    }
}

/// Who receives an outbound event.
enum Audience {
    All,
    AllExcept(ConnectionId),
    Only(ConnectionId),
}

type Outbox = Vec<(Audience, RoomEvent)>;

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<S> {
    room: Room,
    config: RoomConfig,
    /// Subscribed connections. Ordered so broadcasts are deterministic.
    members: BTreeMap<ConnectionId, Member>,
    deadlines: DeadlineScheduler<DeadlineKey>,
    /// Set while nobody is subscribed.
    idle_since: Option<Instant>,
    store: RoomStore<S>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl<S: KeyValueStore> RoomActor<S> {
    /// Runs the actor loop until the room goes idle or every handle is
    /// dropped.
    async fn run(mut self) {
        tracing::info!(room_code = %self.room.room_code, "room actor started");

        loop {
            let idle_at = self.idle_deadline();
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(RoomCommand::Stop) | None => break,
                    Some(cmd) => self.handle(cmd).await,
                },
                fired = self.deadlines.expired() => {
                    self.handle_deadline(fired.key).await;
                }
                () = sleep_until(idle_at) => {
                    tracing::info!(room_code = %self.room.room_code, "room idle, stopping actor");
                    break;
                }
            }
        }

        // Refuse whatever is still queued so callers retry on a fresh actor.
        self.receiver.close();
        while let Some(cmd) = self.receiver.recv().await {
            self.reject(cmd);
        }
        self.persist().await;
        tracing::info!(room_code = %self.room.room_code, "room actor stopped");
    }

    async fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { member, reply } => {
                let result = self.handle_join(member);
                self.finish(result, reply).await;
            }
            RoomCommand::Leave { conn, reply } => {
                let result = self.handle_leave(conn, true);
                self.finish(result, reply).await;
            }
            RoomCommand::Disconnect { conn } => {
                if let Ok(out) = self.handle_leave(conn, false) {
                    self.commit(out).await;
                }
            }
            RoomCommand::PostMessage { conn, text, reply } => {
                let result = self.handle_post(conn, &text);
                self.finish(result, reply).await;
            }
            RoomCommand::StartGame { conn, setup, reply } => {
                let result = self.handle_start_game(conn, setup);
                self.finish(result, reply).await;
            }
            RoomCommand::GameAction { conn, action, reply } => {
                let result = self.handle_game_action(conn, action);
                self.finish(result, reply).await;
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(self.room.clone()));
            }
            RoomCommand::Stop => {}
        }
    }

    /// Commits an accepted mutation, then answers the caller. Rejected
    /// commands change nothing and are only answered.
    async fn finish(&mut self, result: Result<Outbox, RoomError>, reply: Reply<()>) {
        match result {
            Ok(out) => {
                self.commit(out).await;
                let _ = reply.send(Ok(()));
            }
            Err(err) => {
                tracing::debug!(
                    room_code = %self.room.room_code,
                    error = %err,
                    "command rejected"
                );
                let _ = reply.send(Err(err));
            }
        }
    }

    async fn commit(&mut self, out: Outbox) {
        self.room.last_activity = now_ms();
        self.persist().await;
        self.dispatch(out);
    }

    async fn persist(&self) {
        if let Err(error) = self.store.save(&self.room).await {
            tracing::warn!(
                room_code = %self.room.room_code,
                %error,
                "failed to persist room snapshot"
            );
        }
    }

    fn reject(&self, cmd: RoomCommand) {
        let err = || RoomError::Unavailable(self.room.room_code.clone());
        match cmd {
            RoomCommand::Join { reply, .. }
            | RoomCommand::Leave { reply, .. }
            | RoomCommand::PostMessage { reply, .. }
            | RoomCommand::StartGame { reply, .. }
            | RoomCommand::GameAction { reply, .. } => {
                let _ = reply.send(Err(err()));
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(Err(err()));
            }
            RoomCommand::Disconnect { .. } | RoomCommand::Stop => {}
        }
    }

    // -- membership -------------------------------------------------------

    fn handle_join(&mut self, member: Member) -> Result<Outbox, RoomError> {
        let conn = member.conn;
        let mut out = Outbox::new();

        let is_new = self.room.participant(&member.user_id).is_none();
        if is_new && self.room.participants.len() >= self.config.max_participants {
            return Err(RoomError::RoomFull(self.room.room_code.clone()));
        }
        if self.room.name_taken_by_other(&member.display_name, &member.user_id) {
            return Err(RoomError::NameTaken(member.display_name));
        }
        match self.room.participant_mut(&member.user_id) {
            Some(existing) => {
                existing.is_online = true;
                existing.display_name = member.display_name.clone();
            }
            None => {
                let now = now_ms();
                self.room
                    .participants
                    .push(Participant::new(member.user_id.clone(), &member.display_name, now));
                let notice = Message::system(
                    SystemEvent::UserJoined {
                        user_name: member.display_name.clone(),
                    },
                    now,
                );
                self.room.messages.push(notice.clone());
                out.push((Audience::AllExcept(conn), RoomEvent::NewMessage(notice)));
            }
        }

        tracing::info!(
            room_code = %self.room.room_code,
            user_id = %member.user_id,
            %conn,
            "participant joined"
        );
        out.push((
            Audience::AllExcept(conn),
            RoomEvent::ParticipantUpdate(self.room.participants.clone()),
        ));
        self.members.insert(conn, member);
        self.idle_since = None;
        out.push((Audience::Only(conn), RoomEvent::Joined(Box::new(self.room.clone()))));
        Ok(out)
    }

    /// Handles both an explicit leave (`announce`) and a dropped
    /// connection. The participant record stays, marked offline.
    fn handle_leave(&mut self, conn: ConnectionId, announce: bool) -> Result<Outbox, RoomError> {
        let member = self.members.remove(&conn).ok_or(RoomError::NotInRoom)?;
        if self.members.is_empty() {
            self.idle_since = Some(Instant::now());
        }

        let mut out = Outbox::new();
        let still_connected = self.members.values().any(|m| m.user_id == member.user_id);
        if !still_connected {
            if let Some(p) = self.room.participant_mut(&member.user_id) {
                p.is_online = false;
            }
            if announce {
                let notice = Message::system(
                    SystemEvent::UserLeft {
                        user_name: member.display_name.clone(),
                    },
                    now_ms(),
                );
                self.room.messages.push(notice.clone());
                out.push((Audience::All, RoomEvent::NewMessage(notice)));
            }
            out.push((
                Audience::All,
                RoomEvent::ParticipantUpdate(self.room.participants.clone()),
            ));
            // An absent participant no longer holds up the round.
            out.extend(self.close_round_if_complete(now_ms()).unwrap_or_default());
        }

        tracing::info!(
            room_code = %self.room.room_code,
            user_id = %member.user_id,
            %conn,
            explicit = announce,
            "participant left"
        );
        Ok(out)
    }

    fn member(&self, conn: ConnectionId) -> Result<&Member, RoomError> {
        self.members.get(&conn).ok_or(RoomError::NotInRoom)
    }

    fn require_owner(&self, user: &UserId) -> Result<(), RoomError> {
        if self.room.is_owner(user) {
            Ok(())
        } else {
            Err(RoomError::NotOwner)
        }
    }

    // -- chat -------------------------------------------------------------

    fn handle_post(&mut self, conn: ConnectionId, text: &str) -> Result<Outbox, RoomError> {
        let member = self.member(conn)?;
        let text = Room::validate_chat_text(text, self.config.max_message_len)?;
        let message = Message::chat(member.user_id.clone(), &member.display_name, text, now_ms());
        self.room.messages.push(message.clone());
        Ok(vec![(Audience::All, RoomEvent::NewMessage(message))])
    }

    // -- games ------------------------------------------------------------

    fn handle_start_game(&mut self, conn: ConnectionId, setup: StartGame) -> Result<Outbox, RoomError> {
        let user = self.member(conn)?.user_id.clone();
        self.require_owner(&user)?;
        if self.room.game_state.is_active() {
            return Err(RoomError::GameActive);
        }

        let now = now_ms();
        let announcement = match setup {
            StartGame::Poll(setup) => {
                let (poll, announcement) = PollGame::start(&setup, now)?;
                if let Some(end_at) = poll.end_at {
                    self.schedule(poll.id.clone(), 0, end_at);
                }
                self.room.game_state = GameState::Poll(poll);
                announcement
            }
            StartGame::TileSort(setup) => {
                let (game, announcement) = TileSortGame::start(&setup, now)?;
                self.schedule(game.id.clone(), game.current_round, game.round_deadline());
                self.room.game_state = GameState::TileSort(game);
                announcement
            }
        };

        tracing::info!(
            room_code = %self.room.room_code,
            game = ?self.room.game_state.kind(),
            "game started"
        );
        self.room.messages.push(announcement.clone());
        Ok(vec![
            (Audience::All, RoomEvent::NewMessage(announcement)),
            (Audience::All, RoomEvent::GameUpdate(self.room.game_state.clone())),
        ])
    }

    fn handle_game_action(&mut self, conn: ConnectionId, action: GameAction) -> Result<Outbox, RoomError> {
        let user = self.member(conn)?.user_id.clone();
        let Some(kind) = self.room.game_state.kind() else {
            return Err(RoomError::NoActiveGame);
        };
        let now = now_ms();

        match action {
            GameAction::Vote(vote) => {
                let GameState::Poll(poll) = &mut self.room.game_state else {
                    return Err(RoomError::InvalidAction("vote"));
                };
                poll.vote(&user, vote.option_index)?;
                Ok(vec![(
                    Audience::All,
                    RoomEvent::GameUpdate(self.room.game_state.clone()),
                )])
            }
            GameAction::End => {
                if kind != GameKind::Poll {
                    return Err(RoomError::InvalidAction("end"));
                }
                self.require_owner(&user)?;
                Ok(self.end_poll(now))
            }
            GameAction::Cancel => {
                self.require_owner(&user)?;
                Ok(self.cancel_game())
            }
            GameAction::SubmitResult(report) => {
                let GameState::TileSort(game) = &mut self.room.game_state else {
                    return Err(RoomError::InvalidAction("submit_result"));
                };
                game.submit(&user, &report)?;
                Ok(self.close_round_if_complete(now).unwrap_or_else(|| {
                    vec![(
                        Audience::All,
                        RoomEvent::GameUpdate(self.room.game_state.clone()),
                    )]
                }))
            }
        }
    }

    /// Closes the active poll and announces its results.
    fn end_poll(&mut self, now: Millis) -> Outbox {
        let GameState::Poll(poll) = std::mem::take(&mut self.room.game_state) else {
            return Outbox::new();
        };
        self.deadlines.cancel_where(|k| k.game == poll.id);

        let result = poll.result_message(now);
        self.room.messages.push(result.clone());
        tracing::info!(
            room_code = %self.room.room_code,
            total_votes = poll.total_votes(),
            "poll ended"
        );
        vec![
            (Audience::All, RoomEvent::NewMessage(result)),
            (Audience::All, RoomEvent::GameUpdate(GameState::None)),
        ]
    }

    /// Drops the active game without results. A cancelled poll's question
    /// is removed from the history.
    fn cancel_game(&mut self) -> Outbox {
        let previous = std::mem::take(&mut self.room.game_state);
        if let Some(id) = previous.id() {
            self.deadlines.cancel_where(|k| k.game == *id);
        }

        let mut out = Outbox::new();
        if let GameState::Poll(poll) = &previous {
            if self.room.messages.remove(&poll.question_message_id).is_some() {
                out.push((
                    Audience::All,
                    RoomEvent::MessageRemoved(poll.question_message_id.clone()),
                ));
            }
        }
        tracing::info!(
            room_code = %self.room.room_code,
            game = ?previous.kind(),
            "game cancelled"
        );
        out.push((Audience::All, RoomEvent::GameUpdate(GameState::None)));
        out
    }

    fn close_round_if_complete(&mut self, now: Millis) -> Option<Outbox> {
        let GameState::TileSort(game) = &self.room.game_state else {
            return None;
        };
        if !game.all_submitted(&self.room.online_users()) {
            return None;
        }
        Some(self.close_round(now))
    }

    /// Closes the current tile-sort round, starting the next one or
    /// finishing the game.
    fn close_round(&mut self, now: Millis) -> Outbox {
        let participants = self.room.participants.clone();
        let GameState::TileSort(game) = &mut self.room.game_state else {
            return Outbox::new();
        };
        let closed = DeadlineKey {
            game: game.id.clone(),
            round: game.current_round,
        };
        let outcome = game.close_round(&participants, now);
        let next = (game.id.clone(), game.current_round, game.round_deadline());
        self.deadlines.cancel(&closed);

        let message = match outcome {
            RoundClose::Next(message) => {
                let (id, round, deadline) = next;
                self.schedule(id, round, deadline);
                tracing::info!(room_code = %self.room.room_code, round, "tile-sort round started");
                message
            }
            RoundClose::Finished(message) => {
                self.room.game_state = GameState::None;
                tracing::info!(room_code = %self.room.room_code, "tile-sort game finished");
                message
            }
        };
        self.room.messages.push(message.clone());
        vec![
            (Audience::All, RoomEvent::NewMessage(message)),
            (Audience::All, RoomEvent::GameUpdate(self.room.game_state.clone())),
        ]
    }

    // -- deadlines --------------------------------------------------------

    /// Schedules a deadline at wall-clock `at` (epoch ms).
    fn schedule(&mut self, game: GameId, round: u8, at: Millis) {
        let delay = Duration::from_millis(at.saturating_sub(now_ms()));
        self.deadlines
            .schedule_at(DeadlineKey { game, round }, Instant::now() + delay);
    }

    /// Re-registers the deadline of a game restored from a snapshot.
    fn reschedule(&mut self) {
        match &self.room.game_state {
            GameState::Poll(poll) => {
                if let Some(end_at) = poll.end_at {
                    self.schedule(poll.id.clone(), 0, end_at);
                }
            }
            GameState::TileSort(game) => {
                self.schedule(game.id.clone(), game.current_round, game.round_deadline());
            }
            GameState::None => {}
        }
    }

    async fn handle_deadline(&mut self, key: DeadlineKey) {
        let now = now_ms();
        let out = match &self.room.game_state {
            GameState::Poll(poll) if poll.id == key.game => self.end_poll(now),
            GameState::TileSort(game) if game.id == key.game && game.current_round == key.round => {
                self.close_round(now)
            }
            _ => {
                tracing::debug!(
                    room_code = %self.room.room_code,
                    game = %key.game,
                    round = key.round,
                    "stale deadline ignored"
                );
                return;
            }
        };
        self.commit(out).await;
    }

    fn idle_deadline(&self) -> Option<Instant> {
        match self.idle_since {
            Some(since) if self.deadlines.is_empty() => Some(since + self.config.idle_timeout),
            _ => None,
        }
    }

    // -- delivery ---------------------------------------------------------

    /// Delivers outbound events. A closed receiver means the connection is
    /// going away; its disconnect command will follow.
    fn dispatch(&self, out: Outbox) {
        for (audience, event) in out {
            match audience {
                Audience::All => {
                    for member in self.members.values() {
                        let _ = member.events.send(event.clone());
                    }
                }
                Audience::AllExcept(excluded) => {
                    for (conn, member) in &self.members {
                        if *conn != excluded {
                            let _ = member.events.send(event.clone());
                        }
                    }
                }
                Audience::Only(conn) => {
                    if let Some(member) = self.members.get(&conn) {
                        let _ = member.events.send(event);
                    }
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Spawns an actor for `room` and returns a handle plus the task.
///
/// Nobody is subscribed yet, so every participant starts offline; joining
/// flips them back. Pending game deadlines are re-armed from the snapshot.
pub(crate) fn spawn_room<S: KeyValueStore>(
    mut room: Room,
    config: RoomConfig,
    store: RoomStore<S>,
) -> (RoomHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.channel_size);

    room.messages.set_limit(config.history_limit);
    for p in &mut room.participants {
        p.is_online = false;
    }
    let room_code = room.room_code.clone();

    let mut actor = RoomActor {
        room,
        config,
        members: BTreeMap::new(),
        deadlines: DeadlineScheduler::new(),
        idle_since: Some(Instant::now()),
        store,
        receiver: rx,
    };
    actor.reschedule();

    let task = tokio::spawn(actor.run());
    (RoomHandle { room_code, sender: tx }, task)
}
