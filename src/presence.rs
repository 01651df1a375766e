//! Realtime presence connection.
//!
//! ARCHITECTURE
//! ============
//! One Socket.IO connection per authenticated user, opened over a raw
//! Engine.IO WebSocket (no long-polling). A spawned task owns the socket:
//! it answers heartbeats, forwards `getOnlineUsers` events to a
//! [`PresenceSink`], and exits on server close or on [`PresenceConnection::disconnect`].
//!
//! The controller only sees the [`PresenceConnector`] / [`PresenceConnection`]
//! traits, so tests can substitute an in-memory connector.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use packets::{ENGINE_PROTOCOL, EnginePacket, SocketPacket};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::RealtimeError;

/// Server-pushed event carrying the current online user ids.
pub const ONLINE_USERS_EVENT: &str = "getOnlineUsers";

/// Socket.IO mount path on the backend.
pub const SOCKET_PATH: &str = "/socket.io/";

/// Receives events from an open presence connection.
pub trait PresenceSink: Send + Sync {
    /// Full replacement list of online user ids.
    fn online_users(&self, user_ids: Vec<String>);

    /// The server or network ended the connection.
    fn closed(&self);
}

/// Handle to one open realtime connection.
pub trait PresenceConnection: Send + Sync {
    fn is_open(&self) -> bool;

    /// Close the connection. Idempotent; the sink is not told.
    fn disconnect(&self);
}

/// Opens realtime connections tagged with a user id.
#[async_trait::async_trait]
pub trait PresenceConnector: Send + Sync {
    async fn connect(
        &self,
        user_id: &str,
        sink: Arc<dyn PresenceSink>,
    ) -> Result<Box<dyn PresenceConnection>, RealtimeError>;
}

/// Build the WebSocket URL for `user_id` from an http(s) backend origin.
///
/// # Errors
///
/// Returns [`RealtimeError::InvalidUrl`] for non-http(s) origins.
pub fn socket_url(backend_url: &str, user_id: &str) -> Result<String, RealtimeError> {
    let ws_base = if let Some(rest) = backend_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = backend_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else {
        return Err(RealtimeError::InvalidUrl(backend_url.to_owned()));
    };
    let base = format!("{}{SOCKET_PATH}", ws_base.trim_end_matches('/'));
    let eio = ENGINE_PROTOCOL.to_string();
    let url = reqwest::Url::parse_with_params(
        &base,
        &[
            ("EIO", eio.as_str()),
            ("transport", "websocket"),
            ("userId", user_id),
        ],
    )
    .map_err(|e| RealtimeError::InvalidUrl(format!("{base}: {e}")))?;
    Ok(url.to_string())
}

/// What the socket task should do after one inbound text message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Engine handshake: send `reply`, then expect traffic at least every `liveness`.
    Open { reply: String, liveness: Duration },
    Reply(String),
    Presence(Vec<String>),
    Close,
    Ignore,
}

/// Interpret one inbound Engine.IO text message.
pub(crate) fn step(raw: &str) -> Step {
    let packet = match EnginePacket::decode(raw) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable engine packet");
            return Step::Ignore;
        }
    };

    match packet {
        EnginePacket::Open(handshake) => {
            tracing::debug!(
                sid = %handshake.sid,
                ping_interval = handshake.ping_interval,
                ping_timeout = handshake.ping_timeout,
                "engine open"
            );
            Step::Open {
                reply: EnginePacket::Message(SocketPacket::connect().encode()).encode(),
                liveness: Duration::from_millis(
                    handshake.ping_interval.saturating_add(handshake.ping_timeout),
                ),
            }
        }
        EnginePacket::Ping(payload) => Step::Reply(EnginePacket::Pong(payload).encode()),
        EnginePacket::Close => Step::Close,
        EnginePacket::Message(payload) => socket_step(&payload),
        EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => Step::Ignore,
    }
}

fn socket_step(payload: &str) -> Step {
    let packet = match SocketPacket::decode(payload) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable socket packet");
            return Step::Ignore;
        }
    };
    if packet.namespace() != packets::DEFAULT_NAMESPACE {
        return Step::Ignore;
    }

    match &packet {
        SocketPacket::Connect { data, .. } => {
            let sid = data.as_ref().and_then(|d| d.get("sid")).and_then(Value::as_str);
            tracing::debug!(?sid, "socket connected");
            Step::Ignore
        }
        SocketPacket::Disconnect { .. } => Step::Close,
        SocketPacket::ConnectError { data, .. } => {
            let message = data
                .as_ref()
                .and_then(|d| d.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("connect refused");
            tracing::warn!(reason = message, "realtime connect rejected");
            Step::Close
        }
        SocketPacket::Event { .. } if packet.event_name() == Some(ONLINE_USERS_EVENT) => {
            match packet.event_args().first() {
                Some(Value::Array(ids)) => Step::Presence(
                    ids.iter()
                        .filter_map(Value::as_str)
                        .map(ToOwned::to_owned)
                        .collect(),
                ),
                _ => {
                    tracing::debug!("presence event without id list");
                    Step::Ignore
                }
            }
        }
        SocketPacket::Event { .. } | SocketPacket::Ack { .. } => Step::Ignore,
    }
}

/// Socket.IO-over-WebSocket [`PresenceConnector`].
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    backend_url: String,
    connect_timeout: Duration,
}

impl SocketIoConnector {
    #[must_use]
    pub fn new(backend_url: &str, connect_timeout: Duration) -> Self {
        Self {
            backend_url: backend_url.trim_end_matches('/').to_owned(),
            connect_timeout,
        }
    }
}

#[async_trait::async_trait]
impl PresenceConnector for SocketIoConnector {
    async fn connect(
        &self,
        user_id: &str,
        sink: Arc<dyn PresenceSink>,
    ) -> Result<Box<dyn PresenceConnection>, RealtimeError> {
        let url = socket_url(&self.backend_url, user_id)?;
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| RealtimeError::Timeout)?
            .map_err(|e| RealtimeError::Connect(Box::new(e)))?;
        tracing::info!(%user_id, "realtime connection opened");

        let open = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(run_socket(
            stream,
            sink,
            Arc::clone(&open),
            Arc::clone(&shutdown),
        ));

        Ok(Box::new(SocketIoConnection {
            open,
            shutdown,
            task,
        }))
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn run_socket(
    stream: WsStream,
    sink: Arc<dyn PresenceSink>,
    open: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    let (mut write, mut read) = stream.split();
    // Armed by the handshake; any inbound frame pushes it back.
    let mut liveness: Option<Duration> = None;
    let silence = tokio::time::sleep_until(Instant::now());
    tokio::pin!(silence);

    loop {
        tokio::select! {
            () = shutdown.notified() => {
                let bye = EnginePacket::Message(SocketPacket::disconnect().encode()).encode();
                let _ = write.send(Message::text(bye)).await;
                let _ = write.close().await;
                tracing::debug!("realtime connection closed by client");
                return;
            }
            () = &mut silence, if liveness.is_some() => {
                tracing::warn!(?liveness, "no traffic from server within ping deadline");
                break;
            }
            message = read.next() => {
                if let (Some(Ok(_)), Some(window)) = (&message, liveness) {
                    silence.as_mut().reset(deadline_after(window));
                }
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!("ignoring binary realtime frame");
                        continue;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "realtime connection failed");
                        break;
                    }
                };

                let reply = match step(text.as_str()) {
                    Step::Open { reply, liveness: window } => {
                        liveness = Some(window);
                        silence.as_mut().reset(deadline_after(window));
                        reply
                    }
                    Step::Reply(reply) => reply,
                    Step::Presence(user_ids) => {
                        tracing::debug!(count = user_ids.len(), "presence update");
                        sink.online_users(user_ids);
                        continue;
                    }
                    Step::Close => break,
                    Step::Ignore => continue,
                };
                if let Err(e) = write.send(Message::text(reply)).await {
                    tracing::warn!(error = %e, "realtime send failed");
                    break;
                }
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    tracing::info!("realtime connection ended");
    sink.closed();
}

fn deadline_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window)
        .unwrap_or_else(|| now + Duration::from_secs(86_400))
}

/// Handle returned by [`SocketIoConnector`].
pub struct SocketIoConnection {
    open: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PresenceConnection for SocketIoConnection {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    fn disconnect(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.shutdown.notify_one();
        }
    }
}

impl Drop for SocketIoConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
