//! `ShoutboxServer` builder and server loop.
//!
//! This is the entry point for running a Shoutbox server. It ties
//! together all the layers: transport → protocol → session → room.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;

use shoutbox_protocol::{Codec, JsonCodec};
use shoutbox_room::{KeyValueStore, MemoryStore, RoomManager};
use shoutbox_session::{RateLimiter, SessionManager};
use shoutbox_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{ServerConfig, ShoutboxError};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The room
/// manager and rate limiter synchronize internally.
pub(crate) struct ServerState<S, C> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) rooms: RoomManager<S>,
    pub(crate) limiter: RateLimiter,
    pub(crate) config: ServerConfig,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a Shoutbox server.
///
/// # Example
///
/// ```rust,no_run
/// use shoutbox::prelude::*;
///
/// # async fn start() -> Result<(), ShoutboxError> {
/// let server = ShoutboxServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ShoutboxServerBuilder<S = MemoryStore> {
    config: ServerConfig,
    store: S,
}

impl ShoutboxServerBuilder<MemoryStore> {
    /// Creates a new builder with default settings and an in-process store.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            store: MemoryStore::new(),
        }
    }
}

impl Default for ShoutboxServerBuilder<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: KeyValueStore> ShoutboxServerBuilder<S> {
    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Replaces the whole configuration, including the bind address.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the store room snapshots are persisted to.
    pub fn store<T: KeyValueStore>(self, store: T) -> ShoutboxServerBuilder<T> {
        ShoutboxServerBuilder {
            config: self.config,
            store,
        }
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<ShoutboxServer<S, JsonCodec>, ShoutboxError> {
        let transport = WebSocketTransport::bind(&self.config.bind).await?;

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new()),
            rooms: RoomManager::new(self.config.room.clone(), self.store),
            limiter: RateLimiter::new(),
            config: self.config,
            codec: JsonCodec,
        });

        Ok(ShoutboxServer { transport, state })
    }
}

/// A Shoutbox server bound to its listener.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ShoutboxServer<S = MemoryStore, C = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S, C>>,
}

impl ShoutboxServer {
    /// Creates a new builder.
    pub fn builder() -> ShoutboxServerBuilder {
        ShoutboxServerBuilder::new()
    }
}

impl<S, C> ShoutboxServer<S, C>
where
    S: KeyValueStore,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), ShoutboxError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then stops every
    /// room actor so their final snapshots are written.
    ///
    /// Each accepted connection gets its own handler task. A background
    /// task sweeps idle rate-limit windows and expired store keys once per
    /// chat window.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ShoutboxError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Shoutbox server running");
        let sweeper = tokio::spawn(sweep(Arc::clone(&self.state)));
        let mut shutdown = pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("Shoutbox server shutting down");
        sweeper.abort();
        self.state.rooms.shutdown().await;
        Ok(())
    }
}

/// Periodic housekeeping for state that expires lazily.
async fn sweep<S: KeyValueStore, C: Codec>(state: Arc<ServerState<S, C>>) {
    let window = state.config.chat_limit.window;
    let mut ticker = tokio::time::interval(window);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let pruned = state.limiter.prune(window);
        let purged = state.rooms.store().backend().sweep();
        tracing::debug!(pruned, purged, "sweep finished");
    }
}
