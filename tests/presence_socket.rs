//! `SocketIoConnector` against a scripted local WebSocket server.
//!
//! The server side is raw `tokio-tungstenite`, playing the part of a Socket.IO
//! backend one text frame at a time.

use std::sync::Arc;
use std::time::Duration;

use chat_session::RealtimeError;
use chat_session::presence::{
    PresenceConnection, PresenceConnector, PresenceSink, SocketIoConnector,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

const OPEN: &str = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

#[derive(Debug, PartialEq)]
enum SinkEvent {
    Users(Vec<String>),
    Closed,
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl PresenceSink for ChannelSink {
    fn online_users(&self, user_ids: Vec<String>) {
        let _ = self.tx.send(SinkEvent::Users(user_ids));
    }

    fn closed(&self) {
        let _ = self.tx.send(SinkEvent::Closed);
    }
}

fn channel_sink() -> (Arc<dyn PresenceSink>, mpsc::UnboundedReceiver<SinkEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelSink { tx }), rx)
}

/// Accept one WebSocket client, reporting the request URI it used.
async fn accept_one(listener: TcpListener) -> (WebSocketStream<TcpStream>, String) {
    let (stream, _) = listener.accept().await.expect("accept");
    let (uri_tx, uri_rx) = oneshot::channel();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let _ = uri_tx.send(req.uri().to_string());
        Ok(resp)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .expect("websocket handshake");
    (ws, uri_rx.await.expect("uri"))
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
    loop {
        let message = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for client frame")?;
        match message {
            Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

async fn send_text(ws: &mut WebSocketStream<TcpStream>, text: &str) {
    ws.send(Message::text(text.to_owned())).await.expect("server send");
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SinkEvent>) -> SinkEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for sink event")
        .expect("sink channel closed")
}

async fn bound() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    (listener, format!("http://{addr}"))
}

#[tokio::test]
async fn handshake_heartbeat_presence_and_client_disconnect() {
    let (listener, base) = bound().await;
    let server = tokio::spawn(async move {
        let (mut ws, uri) = accept_one(listener).await;
        assert_eq!(uri, "/socket.io/?EIO=4&transport=websocket&userId=u1");

        send_text(&mut ws, OPEN).await;
        assert_eq!(next_text(&mut ws).await.as_deref(), Some("40"));
        send_text(&mut ws, r#"40{"sid":"abc"}"#).await;

        send_text(&mut ws, "2").await;
        assert_eq!(next_text(&mut ws).await.as_deref(), Some("3"));

        send_text(&mut ws, r#"42["newMessage",{"text":"hi"}]"#).await;
        send_text(&mut ws, r#"42["getOnlineUsers",["u1","u2"]]"#).await;

        // Client disconnect: namespace leave, then the close frame.
        assert_eq!(next_text(&mut ws).await.as_deref(), Some("41"));
        assert_eq!(next_text(&mut ws).await, None);
    });

    let (sink, mut events) = channel_sink();
    let connector = SocketIoConnector::new(&base, Duration::from_secs(2));
    let connection = connector.connect("u1", sink).await.expect("connect");
    assert!(connection.is_open());

    assert_eq!(
        next_event(&mut events).await,
        SinkEvent::Users(vec!["u1".to_owned(), "u2".to_owned()])
    );

    connection.disconnect();
    assert!(!connection.is_open());
    server.await.expect("server task");

    // A client-side disconnect does not report `closed`.
    assert!(
        timeout(Duration::from_millis(100), events.recv())
            .await
            .map_or(true, |event| event.is_none())
    );
}

#[tokio::test]
async fn server_disconnect_reports_closed() {
    let (listener, base) = bound().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(listener).await;
        send_text(&mut ws, OPEN).await;
        assert_eq!(next_text(&mut ws).await.as_deref(), Some("40"));
        send_text(&mut ws, "41").await;
        let _ = next_text(&mut ws).await;
    });

    let (sink, mut events) = channel_sink();
    let connector = SocketIoConnector::new(&base, Duration::from_secs(2));
    let connection = connector.connect("u1", sink).await.expect("connect");

    assert_eq!(next_event(&mut events).await, SinkEvent::Closed);
    assert!(!connection.is_open());
    drop(connection);
    server.await.expect("server task");
}

#[tokio::test]
async fn silent_server_is_dropped_after_ping_deadline() {
    let (listener, base) = bound().await;
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(listener).await;
        send_text(&mut ws, r#"0{"sid":"s","upgrades":[],"pingInterval":100,"pingTimeout":100}"#)
            .await;
        assert_eq!(next_text(&mut ws).await.as_deref(), Some("40"));
        // Keep the TCP connection up without sending anything.
        let _ = release_rx.await;
        drop(ws);
    });

    let (sink, mut events) = channel_sink();
    let connector = SocketIoConnector::new(&base, Duration::from_secs(2));
    let connection = connector.connect("u1", sink).await.expect("connect");

    assert_eq!(next_event(&mut events).await, SinkEvent::Closed);
    assert!(!connection.is_open());
    let _ = release_tx.send(());
    server.await.expect("server task");
}

#[tokio::test]
async fn server_pings_keep_connection_alive() {
    let (listener, base) = bound().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(listener).await;
        send_text(&mut ws, r#"0{"sid":"s","upgrades":[],"pingInterval":100,"pingTimeout":100}"#)
            .await;
        assert_eq!(next_text(&mut ws).await.as_deref(), Some("40"));
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            send_text(&mut ws, "2").await;
            assert_eq!(next_text(&mut ws).await.as_deref(), Some("3"));
        }
        assert_eq!(next_text(&mut ws).await.as_deref(), Some("41"));
    });

    let (sink, mut events) = channel_sink();
    let connector = SocketIoConnector::new(&base, Duration::from_secs(2));
    let connection = connector.connect("u1", sink).await.expect("connect");

    // Five pings span 500ms, well past the 200ms window.
    tokio::time::sleep(Duration::from_millis(550)).await;
    assert!(connection.is_open());
    connection.disconnect();
    server.await.expect("server task");
    assert!(
        timeout(Duration::from_millis(100), events.recv())
            .await
            .map_or(true, |event| event.is_none())
    );
}

#[tokio::test]
async fn dropped_socket_reports_closed() {
    let (listener, base) = bound().await;
    let server = tokio::spawn(async move {
        let (ws, _) = accept_one(listener).await;
        drop(ws);
    });

    let (sink, mut events) = channel_sink();
    let connector = SocketIoConnector::new(&base, Duration::from_secs(2));
    let connection = connector.connect("u1", sink).await.expect("connect");
    server.await.expect("server task");

    assert_eq!(next_event(&mut events).await, SinkEvent::Closed);
    assert!(!connection.is_open());
}

#[tokio::test]
async fn refused_connection_is_an_error() {
    let (listener, base) = bound().await;
    drop(listener);

    let (sink, _events) = channel_sink();
    let connector = SocketIoConnector::new(&base, Duration::from_secs(2));
    let err = connector
        .connect("u1", sink)
        .await
        .err()
        .expect("nothing is listening");
    assert!(matches!(err, RealtimeError::Connect(_)));
}

#[tokio::test]
async fn non_http_backend_is_rejected_before_connecting() {
    let (sink, _events) = channel_sink();
    let connector = SocketIoConnector::new("ftp://example.test", Duration::from_secs(2));
    let err = connector
        .connect("u1", sink)
        .await
        .err()
        .expect("invalid url");
    assert!(matches!(err, RealtimeError::InvalidUrl(_)));
}
