//! Error types for session operations.
//!
//! ERROR HANDLING
//! ==============
//! None of these escape a `SessionController` operation. They are turned into
//! user notifications and `tracing` events at the controller boundary; the
//! types exist so the seams (`AuthApi`, `TokenStore`, `PresenceConnector`)
//! can report failures precisely.

/// Failure of a backend auth call.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The backend answered with `success: false`.
    #[error("{}", .message.as_deref().unwrap_or("request was not successful"))]
    Application { message: Option<String> },

    /// The request never produced a usable response (connect, TLS, decode).
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("request failed with status code {status}")]
    Status { status: u16, message: Option<String> },

    /// The credential route name is not a single plain path segment.
    #[error("invalid auth route: {0:?}")]
    InvalidMode(String),

    /// A success response was missing a field the client needs.
    #[error("response missing expected field `{0}`")]
    MissingField(&'static str),
}

impl AuthError {
    /// Message the backend put in the body, if any.
    #[must_use]
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Application { message } | Self::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// True for structured `success: false` answers, false for transport-level failures.
    #[must_use]
    pub fn is_application(&self) -> bool {
        matches!(self, Self::Application { .. })
    }
}

/// Failure reading or writing persisted client storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage file is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Failure opening or driving the realtime connection.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("invalid backend URL for realtime connection: {0}")]
    InvalidUrl(String),
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("timed out opening realtime connection")]
    Timeout,
    #[error("packet decode failed: {0}")]
    Decode(#[from] packets::CodecError),
}

/// Failure building configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid backend URL {0:?}: expected http:// or https://")]
    InvalidBackendUrl(String),
}
