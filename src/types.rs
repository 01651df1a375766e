//! Wire DTOs for the auth endpoints and the user-facing notification type.
//!
//! DESIGN
//! ======
//! The user profile is owned by the backend and rendered by the front end;
//! this crate only needs its identifier to tag the realtime connection, so the
//! profile stays an opaque JSON object.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend user record, kept as received.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(pub Map<String, Value>);

impl UserProfile {
    /// Identifier used to tag the realtime connection.
    ///
    /// Reads `_id`, then `id`. Numeric ids are rendered as decimal strings.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        ["_id", "id"].iter().find_map(|key| match self.0.get(*key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Read a string field, e.g. `fullName` or `email`.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for UserProfile {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Response of `GET /api/auth/check`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub success: bool,
    pub user: Option<UserProfile>,
    pub message: Option<String>,
}

/// Response of `POST /api/auth/{mode}`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    pub user_data: Option<UserProfile>,
    pub token: Option<String>,
    pub message: Option<String>,
}

/// Response of `PUT /api/auth/update-profile`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateProfileResponse {
    #[serde(default)]
    pub success: bool,
    pub user: Option<UserProfile>,
    pub message: Option<String>,
}

/// Which auth sub-route a credential submission goes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginMode {
    Login,
    Register,
    Other(String),
}

impl LoginMode {
    #[must_use]
    pub fn as_path_segment(&self) -> &str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::Other(segment) => segment.trim_matches('/'),
        }
    }

    /// True when the segment is a single plain route name: non-empty ASCII
    /// letters, digits, `-` and `_`. Anything else could escape `/api/auth/`.
    #[must_use]
    pub fn is_routable(&self) -> bool {
        let segment = self.as_path_segment();
        !segment.is_empty()
            && segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

impl fmt::Display for LoginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path_segment())
    }
}

impl From<&str> for LoginMode {
    fn from(raw: &str) -> Self {
        match raw {
            "login" => Self::Login,
            "register" => Self::Register,
            other => Self::Other(other.to_owned()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

/// Transient user-visible message (a toast in a graphical front end).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }
}
