//! Client-side session state for the chat backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! A front end (the bundled CLI, or any UI) owns one [`SessionController`].
//! The controller keeps the bearer token and user profile, calls the backend
//! auth endpoints, persists the token between runs, and holds one realtime
//! connection that streams the online-user list.
//!
//! `api`, `storage`, `notify`, and `presence` each expose a trait seam with a
//! production implementation; `session` composes them.

pub mod api;
pub mod config;
pub mod error;
pub mod notify;
pub mod presence;
pub mod session;
pub mod storage;
pub mod types;

pub use config::SessionConfig;
pub use error::{AuthError, ConfigError, RealtimeError, StoreError};
pub use session::{Session, SessionController};
pub use types::{LoginMode, Notification, NotificationKind, UserProfile};
