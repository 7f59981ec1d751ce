//! Client Session
//!
//! Drives one upgraded WebSocket connection for its whole lifetime:
//!
//! - a forwarder task writes the latest snapshot and periodic pings, each write
//!   bounded by the write timeout
//! - a receiver task watches the socket for pongs, other traffic and close
//!
//! Whichever task finishes first aborts the other, and the client is removed
//! from the registry. Removal from the registry (by a failed broadcast or
//! shutdown) closes the client's slot, which ends the forwarder.

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};

use super::hub::{ClientId, ClientRegistry};
use crate::config::ServerConfig;
use crate::telemetry::TelemetryStore;

/// Liveness and write limits for each client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub write_timeout: Duration,
}

impl From<&ServerConfig> for SessionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            pong_timeout: config.pong_timeout(),
            write_timeout: config.write_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the socket or its stream ended
    PeerClosed,
    /// A write failed or exceeded the write timeout
    WriteFailed,
    /// No pong (or any other traffic) within the pong timeout
    PongTimeout,
    /// The registry dropped the client
    Unregistered,
}

/// Run a client session until it ends, then unregister the client
pub async fn run_session<S, R>(
    mut sink: S,
    mut stream: R,
    registry: Arc<ClientRegistry>,
    store: Arc<TelemetryStore>,
    settings: SessionSettings,
) -> SessionEnd
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send + 'static,
{
    let (client_id, mut slot) = registry.register();

    // New clients get the current view straight away
    let snapshot = store.snapshot();
    if snapshot.has_data() {
        match serde_json::to_string(&snapshot) {
            Ok(text) => {
                if !write(&mut sink, Message::Text(text), settings.write_timeout, client_id).await {
                    registry.unregister(client_id);
                    return SessionEnd::WriteFailed;
                }
            }
            Err(e) => tracing::error!(client_id, error = %e, "Failed to serialize snapshot"),
        }
    }

    let (seen_tx, seen_rx) = watch::channel(Instant::now());

    let mut forward_task = tokio::spawn(async move {
        let mut ping = interval(settings.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.tick().await;

        loop {
            tokio::select! {
                changed = slot.changed() => {
                    if changed.is_err() {
                        return SessionEnd::Unregistered;
                    }
                    let latest = slot.borrow_and_update().clone();
                    let Some(payload) = latest else {
                        continue;
                    };
                    let message = Message::Text(payload.to_string());
                    if !write(&mut sink, message, settings.write_timeout, client_id).await {
                        return SessionEnd::WriteFailed;
                    }
                }
                _ = ping.tick() => {
                    let silent_for = seen_rx.borrow().elapsed();
                    if silent_for > settings.pong_timeout {
                        tracing::warn!(client_id, silent_ms = silent_for.as_millis() as u64, "Client missed pong, dropping");
                        return SessionEnd::PongTimeout;
                    }
                    if !write(&mut sink, Message::Ping(Vec::new()), settings.write_timeout, client_id).await {
                        return SessionEnd::WriteFailed;
                    }
                }
            }
        }
    });

    let mut receive_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::debug!(client_id, "Client requested close");
                    break;
                }
                Ok(_) => {
                    // Pongs and any other client traffic prove liveness
                    let _ = seen_tx.send(Instant::now());
                }
                Err(e) => {
                    tracing::debug!(client_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
        SessionEnd::PeerClosed
    });

    let end = tokio::select! {
        end = &mut forward_task => {
            receive_task.abort();
            end.unwrap_or(SessionEnd::WriteFailed)
        }
        end = &mut receive_task => {
            forward_task.abort();
            end.unwrap_or(SessionEnd::PeerClosed)
        }
    };

    registry.unregister(client_id);
    tracing::debug!(client_id, reason = ?end, "Session ended");
    end
}

async fn write<S>(sink: &mut S, message: Message, limit: Duration, client_id: ClientId) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(limit, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(client_id, error = %e, "WebSocket send failed");
            false
        }
        Err(_) => {
            tracing::warn!(client_id, timeout_ms = limit.as_millis() as u64, "WebSocket send timed out");
            false
        }
    }
}
