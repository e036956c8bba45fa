//! RCON session management.
//!
//! This module provides [`RconSession`], the authenticated, reconnecting
//! connection to one game server, and the [`GameSession`] trait that the
//! router and scheduler are written against.

mod protocol;

use crate::config::GameServerConfig;
use crate::error::{GamewardenError, Result};
use crate::game::Game;
use protocol::{Packet, SERVERDATA_AUTH_RESPONSE};
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration, Instant};

/// Consecutive failures after which a session reports offline.
const OFFLINE_THRESHOLD: u32 = 2;
/// Deadline for establishing the TCP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for any single packet exchange on an established connection.
const IO_TIMEOUT: Duration = Duration::from_secs(10);
/// Sequence id reserved for the authentication handshake.
const AUTH_ID: i32 = 0;

/// Abstraction over one game server connection.
///
/// [`RconSession`] is the production implementation; tests substitute mocks
/// that count or script invocations.
pub trait GameSession: Send + Sync + 'static {
    /// Execute one RCON command and return the server's response text.
    fn execute(&self, command: &str) -> impl Future<Output = Result<String>> + Send;

    /// Best-effort, non-blocking online flag derived from recent outcomes.
    fn is_online(&self) -> bool;
}

struct SessionState {
    stream: Option<TcpStream>,
    next_id: i32,
}

/// The authenticated RCON connection to one game server.
///
/// At most one command is in flight at a time: callers queue FIFO on the
/// internal mutex, because many game-server RCON implementations mangle
/// responses under concurrent load. Transport failures trigger one
/// transparent reconnect-and-retry per `execute`; authentication failures
/// are surfaced immediately since retrying a bad password cannot help.
pub struct RconSession {
    game: Game,
    addr: String,
    password: String,
    state: Mutex<SessionState>,
    consecutive_failures: AtomicU32,
    last_latency_ms: AtomicU64,
}

impl RconSession {
    pub fn new(config: &GameServerConfig) -> Self {
        Self {
            game: config.game,
            addr: format!("{}:{}", config.host, config.port),
            password: config.password.clone(),
            state: Mutex::new(SessionState {
                stream: None,
                next_id: 1,
            }),
            consecutive_failures: AtomicU32::new(0),
            last_latency_ms: AtomicU64::new(0),
        }
    }

    pub fn game(&self) -> Game {
        self.game
    }

    /// Establish and authenticate the connection. No-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.stream.is_some() {
            return Ok(());
        }
        match self.dial().await {
            Ok(stream) => {
                state.stream = Some(stream);
                self.consecutive_failures.store(0, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Execute one RCON command.
    ///
    /// Connects on demand. On a transport error the connection is dropped
    /// and the command retried once over a fresh connection before the
    /// error is surfaced.
    pub async fn execute(&self, command: &str) -> Result<String> {
        let mut state = self.state.lock().await;

        let first_try = self.try_execute(&mut state, command).await;
        let outcome = match first_try {
            Ok(response) => Ok(response),
            Err(err @ GamewardenError::Auth(_)) => Err(err),
            Err(first_err) => {
                log::debug!(
                    "[{}] retrying '{}' after transport error: {}",
                    self.game.key(),
                    command,
                    first_err
                );
                state.stream = None;
                self.try_execute(&mut state, command).await
            }
        };

        match outcome {
            Ok(response) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                Ok(response)
            }
            Err(err) => {
                state.stream = None;
                self.record_failure();
                Err(err)
            }
        }
    }

    /// Whether the session looked healthy recently. Flips to offline after
    /// [`OFFLINE_THRESHOLD`] consecutive failures, back to online on the
    /// next success.
    pub fn is_online(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) < OFFLINE_THRESHOLD
    }

    /// Round-trip time of the most recent successful command, if any.
    pub fn last_latency_ms(&self) -> Option<u64> {
        match self.last_latency_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    async fn try_execute(&self, state: &mut SessionState, command: &str) -> Result<String> {
        if state.stream.is_none() {
            state.stream = Some(self.dial().await?);
        }
        let Some(stream) = state.stream.as_mut() else {
            return Err(GamewardenError::Connect(format!(
                "{}: no connection",
                self.addr
            )));
        };

        let id = state.next_id;
        state.next_id = if state.next_id == i32::MAX {
            1
        } else {
            state.next_id + 1
        };

        let started = Instant::now();
        let packet = Packet::command(id, command);
        let response = timeout(IO_TIMEOUT, async {
            protocol::write_packet(stream, &packet).await?;
            protocol::read_packet(stream).await
        })
        .await
        .map_err(|_| {
            GamewardenError::Command(format!("{}: timed out waiting for response", self.addr))
        })?
        .map_err(|e| GamewardenError::Command(format!("{}: {}", self.addr, e)))?;

        if response.id != id {
            return Err(GamewardenError::Command(format!(
                "{}: response id {} does not match request id {}",
                self.addr, response.id, id
            )));
        }

        self.last_latency_ms
            .store(started.elapsed().as_millis().max(1) as u64, Ordering::Relaxed);
        Ok(response.body)
    }

    /// Open a TCP connection and run the RCON authentication handshake.
    async fn dial(&self) -> Result<TcpStream> {
        let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| GamewardenError::Connect(format!("{}: connect timed out", self.addr)))?
            .map_err(|e| GamewardenError::Connect(format!("{}: {}", self.addr, e)))?;

        timeout(
            IO_TIMEOUT,
            protocol::write_packet(&mut stream, &Packet::auth(AUTH_ID, &self.password)),
        )
        .await
        .map_err(|_| GamewardenError::Connect(format!("{}: auth write timed out", self.addr)))?
        .map_err(|e| GamewardenError::Connect(format!("{}: {}", self.addr, e)))?;

        // Some servers send an empty RESPONSE_VALUE packet ahead of the
        // auth response; skip past anything that is not the verdict.
        for _ in 0..3 {
            let packet = timeout(IO_TIMEOUT, protocol::read_packet(&mut stream))
                .await
                .map_err(|_| {
                    GamewardenError::Connect(format!("{}: auth response timed out", self.addr))
                })?
                .map_err(|e| GamewardenError::Connect(format!("{}: {}", self.addr, e)))?;

            if packet.ptype == SERVERDATA_AUTH_RESPONSE {
                if packet.id == -1 {
                    return Err(GamewardenError::Auth(format!(
                        "{}: server rejected the RCON password",
                        self.addr
                    )));
                }
                log::info!("[{}] authenticated with {}", self.game.key(), self.addr);
                return Ok(stream);
            }
        }

        Err(GamewardenError::Connect(format!(
            "{}: no auth response received",
            self.addr
        )))
    }
}

impl GameSession for RconSession {
    fn execute(&self, command: &str) -> impl Future<Output = Result<String>> + Send {
        RconSession::execute(self, command)
    }

    fn is_online(&self) -> bool {
        RconSession::is_online(self)
    }
}
