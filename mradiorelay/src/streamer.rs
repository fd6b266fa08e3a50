//! Resilient Relay Streamer
//!
//! ```text
//! Disconnected ─► Connecting ─► Connected
//!      ▲              │             │ error / exit
//!      │              ▼             ▼
//!      └──────── Reconnecting ◄─────┘ ──(max attempts)──► GaveUp
//! ```
//!
//! Every encoder run gets a session number. Reports coming from an older
//! session (a process that was already torn down) are ignored.

use crate::config::RelayConfig;
use crate::encoder::{classify_diagnostic, Diagnostic, EncoderEvent, EncoderHandle, RelayEncoder};
use crate::error::{RelayError, Result};
use crate::ring::PendingBuffer;
use bytes::Bytes;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    GaveUp,
}

/// Snapshot returned by [`RelayStreamer::status`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub state: RelayState,
    pub reconnect_attempts: u32,
    pub buffered_bytes: usize,
    pub host: String,
    pub port: u16,
    pub mount: String,
    pub name: String,
}

struct Shared {
    state: RelayState,
    attempts: u32,
    session: u64,
    pending: PendingBuffer,
    reconnect: CancellationToken,
}

struct Connection {
    input: Box<dyn AsyncWrite + Send + Unpin>,
    cancel: CancellationToken,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct RelayInner {
    config: RelayConfig,
    encoder: Arc<dyn RelayEncoder>,
    shared: Mutex<Shared>,
    connection: tokio::sync::Mutex<Option<Connection>>,
    connecting: tokio::sync::Mutex<()>,
}

/// Outcome of waiting for the encoder's first signal
enum Handshake {
    Confirmed,
    Assumed,
    Failed(RelayError),
}

#[derive(Clone)]
pub struct RelayStreamer {
    inner: Arc<RelayInner>,
}

impl std::fmt::Debug for RelayStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayStreamer")
            .field("target", &self.inner.config.display_url())
            .field("state", &self.state())
            .finish()
    }
}

impl RelayStreamer {
    pub fn new(config: RelayConfig, encoder: Arc<dyn RelayEncoder>) -> Self {
        let pending = PendingBuffer::new(config.max_buffer_size);
        Self {
            inner: Arc::new(RelayInner {
                config,
                encoder,
                shared: Mutex::new(Shared {
                    state: RelayState::Disconnected,
                    attempts: 0,
                    session: 0,
                    pending,
                    reconnect: CancellationToken::new(),
                }),
                connection: tokio::sync::Mutex::new(None),
                connecting: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    pub fn state(&self) -> RelayState {
        self.inner.shared.lock().unwrap().state
    }

    pub fn status(&self) -> RelayStatus {
        let shared = self.inner.shared.lock().unwrap();
        let config = &self.inner.config;
        RelayStatus {
            state: shared.state,
            reconnect_attempts: shared.attempts,
            buffered_bytes: shared.pending.len(),
            host: config.host.clone(),
            port: config.port,
            mount: config.mount.clone(),
            name: config.name.clone(),
        }
    }

    /// Starts the encoder and waits for the connection to be established
    ///
    /// Idempotent: concurrent callers share the attempt in flight, and a
    /// connected streamer returns immediately. While a reconnect is
    /// scheduled, callers get [`RelayError::NotConnected`] instead of
    /// starting another encoder.
    pub async fn connect(&self) -> Result<()> {
        let _connecting = self.inner.connecting.lock().await;

        let session = {
            let mut shared = self.inner.shared.lock().unwrap();
            match shared.state {
                RelayState::Connected => return Ok(()),
                RelayState::GaveUp | RelayState::Reconnecting => {
                    return Err(RelayError::NotConnected)
                }
                RelayState::Disconnected | RelayState::Connecting => {}
            }
            shared.state = RelayState::Connecting;
            shared.session += 1;
            shared.session
        };

        tracing::info!("Connecting to relay at {}", self.inner.config.display_url());

        let outcome = match self.inner.encoder.spawn(&self.inner.config).await {
            Ok(handle) => self.establish(handle, session).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            tracing::error!("Relay connection failed: {}", e);
            // Still under the connecting lock: waiters see Reconnecting
            self.handle_connection_error(session).await;
        }
        outcome
    }

    async fn establish(&self, mut handle: EncoderHandle, session: u64) -> Result<()> {
        let handshake = self.handshake(&mut handle.events).await;

        let confirmed = match handshake {
            Handshake::Confirmed => true,
            Handshake::Assumed => false,
            Handshake::Failed(e) => return Err(e),
        };

        // Ownership of the process moves from the handle to the connection
        let cancel = std::mem::replace(&mut handle.cancel, CancellationToken::new());
        let input = std::mem::replace(&mut handle.input, Box::new(tokio::io::sink()));
        let events = std::mem::replace(&mut handle.events, mpsc::channel(1).1);
        drop(handle);

        let mut connection = Connection { input, cancel };

        // Backlog first, then the stream resumes
        let backlog = self.inner.shared.lock().unwrap().pending.drain();
        let backlog_len: usize = backlog.iter().map(Bytes::len).sum();
        for (i, chunk) in backlog.iter().enumerate() {
            if let Err(e) = connection.input.write_all(chunk).await {
                self.inner
                    .shared
                    .lock()
                    .unwrap()
                    .pending
                    .restore(backlog[i..].to_vec());
                return Err(e.into());
            }
        }

        let mut current = self.inner.connection.lock().await;
        {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.session != session {
                return Err(RelayError::NotConnected);
            }
            shared.state = RelayState::Connected;
            shared.attempts = 0;
        }
        *current = Some(connection);
        drop(current);

        if confirmed {
            tracing::info!("Successfully connected to relay");
        } else {
            tracing::info!("Relay encoder running, assuming connected");
        }
        if backlog_len > 0 {
            tracing::debug!(bytes = backlog_len, "Flushed relay backlog");
        }

        self.monitor(events, session);
        Ok(())
    }

    async fn handshake(&self, events: &mut mpsc::Receiver<EncoderEvent>) -> Handshake {
        let grace = tokio::time::sleep(self.inner.config.connect_grace);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(EncoderEvent::Line(line)) => match classify_diagnostic(&line) {
                        Diagnostic::Connected => return Handshake::Confirmed,
                        Diagnostic::Error(msg) => return Handshake::Failed(RelayError::Diagnostic(msg)),
                        Diagnostic::Info(msg) => tracing::debug!("Relay encoder: {}", msg),
                    },
                    Some(EncoderEvent::Exited(code)) => {
                        tracing::warn!(?code, "Relay encoder exited during handshake");
                        return Handshake::Failed(RelayError::ProcessExited);
                    }
                    None => return Handshake::Failed(RelayError::ProcessExited),
                },
                _ = &mut grace => return Handshake::Assumed,
            }
        }
    }

    /// Watches the encoder of `session` for errors once connected
    fn monitor(&self, mut events: mpsc::Receiver<EncoderEvent>, session: u64) {
        let streamer = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    EncoderEvent::Line(line) => match classify_diagnostic(&line) {
                        Diagnostic::Error(msg) => {
                            tracing::error!("Relay encoder error: {}", msg);
                            break;
                        }
                        Diagnostic::Connected => tracing::debug!("Relay encoder: {}", line),
                        Diagnostic::Info(msg) => tracing::debug!("Relay encoder: {}", msg),
                    },
                    EncoderEvent::Exited(code) => {
                        if code.is_some_and(|c| c != 0) {
                            tracing::error!("Relay encoder exited with code {:?}", code);
                        }
                        break;
                    }
                }
            }
            streamer.handle_connection_error(session).await;
        });
    }

    /// Sends a chunk to the relay, or buffers it while disconnected
    pub async fn write(&self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        let (state, attempts, session) = {
            let shared = self.inner.shared.lock().unwrap();
            (shared.state, shared.attempts, shared.session)
        };

        if state == RelayState::Connected {
            let mut connection = self.inner.connection.lock().await;
            if let Some(conn) = connection.as_mut() {
                let backlog = self.inner.shared.lock().unwrap().pending.drain();
                let mut result = Ok(());
                for (i, pending) in backlog.iter().enumerate() {
                    if let Err(e) = conn.input.write_all(pending).await {
                        let mut shared = self.inner.shared.lock().unwrap();
                        shared.pending.restore(backlog[i..].to_vec());
                        result = Err(e);
                        break;
                    }
                }
                if result.is_ok() {
                    result = conn.input.write_all(&chunk).await;
                }

                match result {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::error!("Error writing to relay: {}", e);
                        self.inner.shared.lock().unwrap().pending.push(chunk);
                        drop(connection);
                        self.handle_connection_error(session).await;
                        return Err(e.into());
                    }
                }
            }
        }

        self.inner.shared.lock().unwrap().pending.push(chunk);

        if state == RelayState::Disconnected && attempts == 0 {
            let streamer = self.clone();
            tokio::spawn(async move {
                if let Err(e) = streamer.connect().await {
                    tracing::debug!("Opportunistic relay connection failed: {}", e);
                }
            });
        }
        Ok(())
    }

    /// Tears down `session` and schedules a reconnect with capped backoff
    ///
    /// Boxed: the scheduled reconnect calls [`connect`](Self::connect),
    /// which awaits this function in turn.
    fn handle_connection_error(
        &self,
        session: u64,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.reschedule(session))
    }

    async fn reschedule(&self, session: u64) {
        let (attempt, token) = {
            let mut shared = self.inner.shared.lock().unwrap();
            if shared.session != session
                || matches!(shared.state, RelayState::Reconnecting | RelayState::GaveUp)
            {
                return;
            }
            if shared.attempts >= self.inner.config.max_reconnect_attempts {
                shared.state = RelayState::GaveUp;
                tracing::error!(
                    "Max reconnection attempts ({}) reached for relay, giving up",
                    self.inner.config.max_reconnect_attempts
                );
                (None, None)
            } else {
                shared.state = RelayState::Reconnecting;
                shared.attempts += 1;
                (Some(shared.attempts), Some(shared.reconnect.child_token()))
            }
        };

        self.inner.connection.lock().await.take();

        let (Some(attempt), Some(token)) = (attempt, token) else {
            return;
        };

        let delay = self.inner.config.backoff(attempt);
        tracing::info!(
            "Scheduling relay reconnection attempt {}/{} in {:?}",
            attempt,
            self.inner.config.max_reconnect_attempts,
            delay
        );

        let streamer = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut shared = streamer.inner.shared.lock().unwrap();
                        if shared.state != RelayState::Reconnecting {
                            return;
                        }
                        shared.state = RelayState::Disconnected;
                    }
                    // Failures reschedule through handle_connection_error
                    let _ = streamer.connect().await;
                }
            }
        });
    }

    /// Cancels pending reconnects, stops the encoder and resets counters
    pub async fn disconnect(&self) {
        {
            let mut shared = self.inner.shared.lock().unwrap();
            shared.reconnect.cancel();
            shared.reconnect = CancellationToken::new();
            shared.session += 1;
            shared.state = RelayState::Disconnected;
            shared.attempts = 0;
            shared.pending.clear();
        }
        self.inner.connection.lock().await.take();
        tracing::info!("Disconnected from relay");
    }
}
