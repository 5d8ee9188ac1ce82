//! `QuizliveServer` builder and server loop.
//!
//! Ties the layers together: transport → protocol → room manager → store.

use std::net::SocketAddr;
use std::sync::Arc;

use quizlive_protocol::{Codec, JsonCodec};
use quizlive_room::RoomManager;
use quizlive_store::{
    spawn_cache_sweeper, HistoryStore, MemoryCache, MemoryCatalog, MemoryHistory,
    QuestionSource, SessionCache, SessionStore,
};
use quizlive_transport::{Transport, WebSocketTransport};
use tokio::task::JoinHandle;

use crate::handler::handle_connection;
use crate::{Authenticator, QuizliveError, ServerConfig};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) rooms: RoomManager,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Quizlive server.
///
/// Backends default to the in-memory ones, which is what tests and demos
/// want. Production plugs in a shared cache and a durable history.
///
/// # Example
///
/// ```rust,ignore
/// use quizlive::prelude::*;
///
/// let server = QuizliveServerBuilder::new()
///     .config(ServerConfig::from_env())
///     .catalog(Arc::new(MemoryCatalog::from_json(&json)?))
///     .build(my_auth)
///     .await?;
/// server.run().await
/// ```
pub struct QuizliveServerBuilder {
    config: ServerConfig,
    cache: Option<Arc<dyn SessionCache>>,
    history: Option<Arc<dyn HistoryStore>>,
    catalog: Option<Arc<dyn QuestionSource>>,
}

impl QuizliveServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            cache: None,
            history: None,
            catalog: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Where room aggregates are mirrored for recovery.
    pub fn cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Where answers, totals, and final results are written.
    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Where question sets and rosters come from.
    pub fn catalog(mut self, catalog: Arc<dyn QuestionSource>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Binds the listener and wires up the store and room manager.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`. Must be called inside a
    /// Tokio runtime (the history writer and the cache sweeper are spawned
    /// here).
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<QuizliveServer<A, JsonCodec>, QuizliveError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let cache: Arc<dyn SessionCache> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(MemoryCache::new()),
        };
        let history: Arc<dyn HistoryStore> = match self.history {
            Some(history) => history,
            None => Arc::new(MemoryHistory::new()),
        };
        let catalog: Arc<dyn QuestionSource> = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(MemoryCatalog::new()),
        };

        let sweeper =
            spawn_cache_sweeper(Arc::clone(&cache), self.config.store.cache_sweep_interval);
        let store = Arc::new(SessionStore::spawn(cache, history, catalog, self.config.store));
        let rooms = RoomManager::new(store, self.config.engine.clone());

        let state = Arc::new(ServerState {
            rooms,
            auth,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(QuizliveServer {
            transport,
            state,
            sweeper,
        })
    }
}

impl Default for QuizliveServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Quizlive server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct QuizliveServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
    sweeper: JoinHandle<()>,
}

impl<A, C> QuizliveServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, QuizliveError> {
        Ok(self.transport.local_addr()?)
    }

    /// The room manager, for in-process inspection.
    pub fn rooms(&self) -> &RoomManager {
        &self.state.rooms
    }

    /// Runs the server accept loop.
    ///
    /// Spawns a handler task per accepted connection. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), QuizliveError> {
        tracing::info!(addr = %self.local_addr()?, "Quizlive server running");

        loop {
            match self.transport.accept().await {
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
            }
        }
    }
}

impl<A: Authenticator, C: Codec> Drop for QuizliveServer<A, C> {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}
