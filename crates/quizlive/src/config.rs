//! Server configuration.

use std::time::Duration;

use quizlive_room::EngineConfig;
use quizlive_store::{env_parse, StoreConfig};

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// Everything the server needs to start.
///
/// ```rust
/// use std::time::Duration;
/// use quizlive::ServerConfig;
///
/// let config = ServerConfig::default()
///     .bind("0.0.0.0:9000")
///     .idle_timeout(Duration::from_secs(60));
/// assert_eq!(config.bind_addr, "0.0.0.0:9000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// How long a new connection has to send its handshake.
    pub handshake_timeout: Duration,
    /// A connection that sends nothing (not even a heartbeat) for this long
    /// is dropped.
    pub idle_timeout: Duration,
    pub engine: EngineConfig,
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads `QUIZLIVE_BIND`, `QUIZLIVE_HANDSHAKE_TIMEOUT_MS` and
    /// `QUIZLIVE_IDLE_TIMEOUT_SECS`, plus the engine and store variables.
    /// Anything unset or unparsable keeps its default.
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_parse("QUIZLIVE_BIND", DEFAULT_BIND.to_string()),
            handshake_timeout: Duration::from_millis(env_parse(
                "QUIZLIVE_HANDSHAKE_TIMEOUT_MS",
                DEFAULT_HANDSHAKE_TIMEOUT_MS,
            )),
            idle_timeout: Duration::from_secs(
                env_parse("QUIZLIVE_IDLE_TIMEOUT_SECS", DEFAULT_IDLE_TIMEOUT_SECS).max(1),
            ),
            engine: EngineConfig::from_env(),
            store: StoreConfig::from_env(),
        }
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }
}
