//! Text packet codec for the realtime presence channel.
//!
//! The backend speaks Socket.IO v5 layered over Engine.IO v4. Every WebSocket
//! text message is one Engine.IO packet; Engine.IO `message` packets carry a
//! Socket.IO packet as their payload. This crate owns both encodings and does
//! no I/O so `chat-session` can drive the socket however it likes.
//!
//! Binary attachments (Socket.IO types 5 and 6) are rejected; presence
//! traffic is plain JSON.


use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace used when a Socket.IO packet does not name one.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO protocol revision sent in the `EIO` query parameter.
pub const ENGINE_PROTOCOL: u8 = 4;

/// Error returned by [`EnginePacket::decode`] and [`SocketPacket::decode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw text was empty.
    #[error("empty packet")]
    Empty,
    /// The leading type character is not a known packet type.
    #[error("unknown packet type: {0:?}")]
    UnknownType(char),
    /// The JSON payload could not be parsed.
    #[error("invalid packet payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The acknowledgement id did not fit in a `u64`.
    #[error("invalid ack id: {0}")]
    InvalidAckId(String),
    /// An EVENT or ACK payload was not a JSON array (or an EVENT had no name).
    #[error("invalid event payload")]
    InvalidEvent,
    /// The packet uses binary attachments.
    #[error("binary packets are not supported")]
    BinaryUnsupported,
}

// =============================================================================
// ENGINE.IO
// =============================================================================

/// Handshake payload carried by the Engine.IO `open` packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the server offers to upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    /// Largest payload the server accepts, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// One Engine.IO v4 packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    /// Heartbeat from the server; the payload (e.g. `"probe"`) must be echoed.
    Ping(Option<String>),
    Pong(Option<String>),
    /// Application payload, normally an encoded [`SocketPacket`].
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Encode into the wire text form.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Open(handshake) => {
                let json = serde_json::to_string(handshake).unwrap_or_default();
                format!("0{json}")
            }
            Self::Close => "1".to_owned(),
            Self::Ping(payload) => format!("2{}", payload.as_deref().unwrap_or("")),
            Self::Pong(payload) => format!("3{}", payload.as_deref().unwrap_or("")),
            Self::Message(payload) => format!("4{payload}"),
            Self::Upgrade => "5".to_owned(),
            Self::Noop => "6".to_owned(),
        }
    }

    /// Decode one wire text message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Empty`] for empty input, [`CodecError::UnknownType`]
    /// for an unrecognised type character, and [`CodecError::InvalidJson`] for
    /// a malformed `open` handshake.
    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        let (kind, payload) = split_type(raw)?;
        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(payload)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(non_empty(payload))),
            '3' => Ok(Self::Pong(non_empty(payload))),
            '4' => Ok(Self::Message(payload.to_owned())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(CodecError::UnknownType(other)),
        }
    }
}

// =============================================================================
// SOCKET.IO
// =============================================================================

/// One Socket.IO v5 packet (text form only).
#[derive(Clone, Debug, PartialEq)]
pub enum SocketPacket {
    /// Namespace connect request (client) or confirmation (server).
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    /// Named event; `data[0]` is the event name, the rest are arguments.
    Event {
        namespace: String,
        id: Option<u64>,
        data: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        data: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// Connect packet for the default namespace.
    #[must_use]
    pub fn connect() -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            data: None,
        }
    }

    /// Disconnect packet for the default namespace.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::Disconnect {
            namespace: DEFAULT_NAMESPACE.to_owned(),
        }
    }

    /// Build an EVENT on the default namespace.
    #[must_use]
    pub fn event(name: &str, args: Vec<Value>) -> Self {
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(Value::String(name.to_owned()));
        data.extend(args);
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            id: None,
            data,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Event name for EVENT packets.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        match self {
            Self::Event { data, .. } => data.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Event arguments (everything after the name) for EVENT packets.
    #[must_use]
    pub fn event_args(&self) -> &[Value] {
        match self {
            Self::Event { data, .. } => data.get(1..).unwrap_or(&[]),
            _ => &[],
        }
    }

    /// Encode into the text form carried inside an Engine.IO `message`.
    #[must_use]
    pub fn encode(&self) -> String {
        let (kind, id, data) = match self {
            Self::Connect { data, .. } => ('0', None, data.clone()),
            Self::Disconnect { .. } => ('1', None, None),
            Self::Event { id, data, .. } => ('2', *id, Some(Value::Array(data.clone()))),
            Self::Ack { id, data, .. } => ('3', Some(*id), Some(Value::Array(data.clone()))),
            Self::ConnectError { data, .. } => ('4', None, data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        let namespace = self.namespace();
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = id {
            let _ = write!(out, "{id}");
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Decode a Socket.IO packet from its text form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BinaryUnsupported`] for binary packet types,
    /// [`CodecError::InvalidEvent`] when an EVENT/ACK payload is not an array,
    /// and the other [`CodecError`] variants for malformed input.
    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        let (kind, mut rest) = split_type(raw)?;
        match kind {
            '0'..='4' => {}
            '5' | '6' => return Err(CodecError::BinaryUnsupported),
            other => return Err(CodecError::UnknownType(other)),
        }

        let namespace = if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            let namespace = rest[..end].to_owned();
            rest = rest.get(end + 1..).unwrap_or("");
            namespace
        } else {
            DEFAULT_NAMESPACE.to_owned()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits == 0 {
            None
        } else {
            let raw_id = &rest[..digits];
            Some(
                raw_id
                    .parse::<u64>()
                    .map_err(|_| CodecError::InvalidAckId(raw_id.to_owned()))?,
            )
        };
        rest = &rest[digits..];

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest)?)
        };

        match kind {
            '0' => Ok(Self::Connect { namespace, data }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let data = into_array(data)?;
                if !data.first().is_some_and(Value::is_string) {
                    return Err(CodecError::InvalidEvent);
                }
                Ok(Self::Event {
                    namespace,
                    id,
                    data,
                })
            }
            '3' => {
                let id = id.ok_or(CodecError::InvalidEvent)?;
                Ok(Self::Ack {
                    namespace,
                    id,
                    data: into_array(data)?,
                })
            }
            _ => Ok(Self::ConnectError { namespace, data }),
        }
    }
}

fn split_type(raw: &str) -> Result<(char, &str), CodecError> {
    let kind = raw.chars().next().ok_or(CodecError::Empty)?;
    Ok((kind, &raw[kind.len_utf8()..]))
}

fn non_empty(payload: &str) -> Option<String> {
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_owned())
    }
}

fn into_array(data: Option<Value>) -> Result<Vec<Value>, CodecError> {
    match data {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(CodecError::InvalidEvent),
    }
}
