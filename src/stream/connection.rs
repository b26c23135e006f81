use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::models::StreamFrame;

/// Literal keep-alive request and reply; neither is JSON
pub const KEEPALIVE_PING: &str = "ping";
pub const KEEPALIVE_PONG: &str = "pong";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callbacks for one logical stream
///
/// Handlers run to completion on the connection task; anything they want to
/// send goes into the [`Outbox`] and is flushed after they return.
pub trait StreamHandler: Send {
    /// A new session is open
    fn on_open(&mut self, outbox: &mut Outbox);

    /// A decoded frame arrived (keep-alive replies never get here)
    fn on_message(&mut self, frame: StreamFrame, outbox: &mut Outbox);

    /// The current session ended
    fn on_close(&mut self) {}
}

/// Frames queued by a handler for the current session
#[derive(Debug, Default)]
pub struct Outbox {
    frames: Vec<String>,
}

impl Outbox {
    pub fn send_json<T: Serialize>(&mut self, message: &T) {
        match serde_json::to_string(message) {
            Ok(text) => self.frames.push(text),
            Err(e) => tracing::error!(error = %e, "Failed to encode outbound frame"),
        }
    }

    pub fn send_text(&mut self, text: impl Into<String>) {
        self.frames.push(text.into());
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.frames)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionPolicy {
    pub keepalive_interval: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Dial,
    Opened,
    Dropped,
    Failed,
    RetryElapsed,
    Shutdown,
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid connection transition from {from:?} on {event:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub event: ConnectionEvent,
}

impl ConnectionState {
    pub fn on(self, event: ConnectionEvent) -> Result<Self, InvalidTransition> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (_, E::Shutdown) => Ok(S::Disconnected),
            (S::Disconnected, E::Dial) => Ok(S::Connecting),
            (S::Connecting, E::Opened) => Ok(S::Open),
            (S::Connecting, E::Failed) => Ok(S::Reconnecting),
            (S::Open, E::Dropped) | (S::Open, E::Failed) => Ok(S::Reconnecting),
            (S::Reconnecting, E::RetryElapsed) => Ok(S::Connecting),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Sessions successfully opened since start
    pub sessions_opened: u64,
}

enum SessionEnd {
    Dropped,
    Failed,
    Shutdown,
}

/// Keeps one WebSocket channel connected until shutdown
///
/// Reconnects after a fixed delay, forever. The keep-alive timer lives
/// inside the session, so a dropped session can never ping again.
pub struct ConnectionManager {
    name: String,
    url: String,
    policy: ConnectionPolicy,
    status: watch::Sender<ConnectionStatus>,
}

impl ConnectionManager {
    pub fn new(name: &str, url: &str, policy: ConnectionPolicy) -> Self {
        let (status, _) = watch::channel(ConnectionStatus {
            state: ConnectionState::Disconnected,
            sessions_opened: 0,
        });
        Self {
            name: name.to_string(),
            url: url.to_string(),
            policy,
            status,
        }
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn transition(&self, event: ConnectionEvent) {
        self.status.send_modify(|status| match status.state.on(event) {
            Ok(next) => {
                if event == ConnectionEvent::Opened {
                    status.sessions_opened += 1;
                }
                status.state = next;
            }
            Err(e) => tracing::warn!(channel = %self.name, error = %e, "Ignoring transition"),
        });
    }

    /// Drive the channel until `shutdown` flips to true (or its sender drops)
    pub async fn run<H: StreamHandler>(&self, handler: &mut H, mut shutdown: watch::Receiver<bool>) {
        self.transition(ConnectionEvent::Dial);

        loop {
            if shutdown_requested(&shutdown) {
                break;
            }

            tracing::info!(channel = %self.name, url = %self.url, "Connecting");
            let connected = tokio::select! {
                result = timeout(self.policy.connect_timeout, connect_async(self.url.as_str())) => result,
                _ = wait_for_shutdown(&mut shutdown) => break,
            };

            let end = match connected {
                Ok(Ok((ws, _))) => {
                    self.transition(ConnectionEvent::Opened);
                    tracing::info!(channel = %self.name, "Connected");
                    self.run_session(ws, handler, &mut shutdown).await
                }
                Ok(Err(e)) => {
                    tracing::warn!(channel = %self.name, error = %e, "Connect failed");
                    SessionEnd::Failed
                }
                Err(_) => {
                    tracing::warn!(
                        channel = %self.name,
                        timeout_secs = self.policy.connect_timeout.as_secs_f64(),
                        "Connect timed out"
                    );
                    SessionEnd::Failed
                }
            };

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Dropped => self.transition(ConnectionEvent::Dropped),
                SessionEnd::Failed => self.transition(ConnectionEvent::Failed),
            }

            tracing::info!(
                channel = %self.name,
                delay_ms = self.policy.reconnect_delay.as_millis() as u64,
                "Reconnecting"
            );
            tokio::select! {
                _ = sleep(self.policy.reconnect_delay) => self.transition(ConnectionEvent::RetryElapsed),
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        self.transition(ConnectionEvent::Shutdown);
        tracing::info!(channel = %self.name, "Stopped");
    }

    async fn run_session<H: StreamHandler>(
        &self,
        ws: WsStream,
        handler: &mut H,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let (mut write, mut read) = ws.split();
        let mut outbox = Outbox::default();

        handler.on_open(&mut outbox);

        let period = self.policy.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let end = 'session: loop {
            for frame in outbox.take() {
                tracing::debug!(channel = %self.name, frame = %frame, "Sending");
                if let Err(e) = write.send(Message::Text(frame)).await {
                    tracing::warn!(channel = %self.name, error = %e, "Send failed");
                    break 'session SessionEnd::Failed;
                }
            }

            tokio::select! {
                _ = wait_for_shutdown(shutdown) => {
                    let _ = write.send(Message::Close(None)).await;
                    break SessionEnd::Shutdown;
                }
                _ = keepalive.tick() => {
                    if let Err(e) = write.send(Message::Text(KEEPALIVE_PING.to_string())).await {
                        tracing::warn!(channel = %self.name, error = %e, "Keep-alive failed");
                        break SessionEnd::Failed;
                    }
                    tracing::trace!(channel = %self.name, "Keep-alive sent");
                }
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text, handler, &mut outbox),
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong; flushing sends it
                        if let Err(e) = write.flush().await {
                            tracing::warn!(channel = %self.name, error = %e, "Pong flush failed");
                            break SessionEnd::Failed;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(channel = %self.name, ?frame, "Closed by server");
                        break SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(channel = %self.name, error = %e, "Transport error");
                        break SessionEnd::Failed;
                    }
                    None => {
                        tracing::info!(channel = %self.name, "Stream ended");
                        break SessionEnd::Dropped;
                    }
                },
            }
        };

        handler.on_close();
        end
    }

    fn dispatch<H: StreamHandler>(&self, text: &str, handler: &mut H, outbox: &mut Outbox) {
        if is_keepalive_reply(text) {
            tracing::trace!(channel = %self.name, "Keep-alive reply");
            return;
        }

        match serde_json::from_str::<StreamFrame>(text) {
            Ok(frame) => handler.on_message(frame, outbox),
            Err(e) => tracing::warn!(
                channel = %self.name,
                error = %e,
                payload = %truncate(text, 256),
                "Dropping undecodable frame"
            ),
        }
    }
}

pub fn is_keepalive_reply(text: &str) -> bool {
    text.trim() == KEEPALIVE_PONG
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolves once shutdown is requested or the sender is gone
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
