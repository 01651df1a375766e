//! Client authentication state and the operations that change it.
//!
//! SYSTEM CONTEXT
//! ==============
//! Front ends hold one `SessionController`, drive its operations from user
//! actions, and render from `subscribe()`. The controller owns the token, the
//! user profile, and the single realtime presence connection.
//!
//! ERROR HANDLING
//! ==============
//! Operations never return errors. Backend and transport failures become
//! notifications; storage and realtime failures are logged. `check_auth`
//! de-authenticates on any failure, `login` and `update_profile` never do.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use crate::api::{AuthApi, HttpAuthApi};
use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::notify::{Notifier, TracingNotifier};
use crate::presence::{PresenceConnection, PresenceConnector, PresenceSink, SocketIoConnector};
use crate::storage::{FileTokenStore, TokenStore};
use crate::types::{LoginMode, LoginResponse, Notification, UserProfile};

pub const LOGGED_OUT_MESSAGE: &str = "Logged out successfully";
pub const PROFILE_UPDATED_MESSAGE: &str = "Profile updated successfully";
pub const LOGGED_IN_FALLBACK_MESSAGE: &str = "Logged in successfully";

/// Observable snapshot of the client session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    /// `None` until the first presence update (or logout) arrives.
    pub online_user_ids: Option<BTreeSet<String>>,
    /// Whether the controller holds an open realtime connection.
    pub connected: bool,
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.online_user_ids
            .as_ref()
            .is_some_and(|ids| ids.contains(user_id))
    }
}

/// Applies presence events to the shared session, ignoring superseded connections.
struct SessionPresenceSink {
    state: Arc<watch::Sender<Session>>,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl SessionPresenceSink {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

impl PresenceSink for SessionPresenceSink {
    fn online_users(&self, user_ids: Vec<String>) {
        if !self.is_current() {
            return;
        }
        self.state
            .send_modify(|s| s.online_user_ids = Some(user_ids.into_iter().collect()));
    }

    fn closed(&self) {
        if !self.is_current() {
            return;
        }
        self.state.send_modify(|s| s.connected = false);
    }
}

pub struct SessionController {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    connector: Arc<dyn PresenceConnector>,
    state: Arc<watch::Sender<Session>>,
    connection: Option<Box<dyn PresenceConnection>>,
    generation: Arc<AtomicU64>,
}

impl SessionController {
    /// Create a controller; the persisted token (if any) seeds the session.
    #[must_use]
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
        connector: Arc<dyn PresenceConnector>,
    ) -> Self {
        let token = load_token(store.as_ref());
        let (state, _) = watch::channel(Session {
            token,
            ..Session::default()
        });
        Self {
            api,
            store,
            notifier,
            connector,
            state: Arc::new(state),
            connection: None,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Controller wired to the real backend, a file token store, and
    /// `tracing`-only notifications.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: &SessionConfig) -> Result<Self, AuthError> {
        Self::from_config_with_notifier(config, Arc::new(TracingNotifier))
    }

    /// Like [`Self::from_config`] with a caller-supplied notifier.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] if the HTTP client cannot be built.
    pub fn from_config_with_notifier(
        config: &SessionConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AuthError> {
        let api = HttpAuthApi::new(config)?;
        let store = FileTokenStore::new(config.storage_path.clone());
        let connector = SocketIoConnector::new(
            &config.backend_url,
            Duration::from_secs(config.timeouts.connect_secs),
        );
        Ok(Self::new(
            Arc::new(api),
            Arc::new(store),
            notifier,
            Arc::new(connector),
        ))
    }

    /// Observe every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_open())
    }

    /// Startup: attach the persisted token and validate it.
    pub async fn initialize(&mut self) {
        let Some(token) = load_token(self.store.as_ref()) else {
            tracing::debug!("no persisted token; starting unauthenticated");
            self.invalidate();
            return;
        };
        self.api.set_default_token(Some(&token));
        self.check_auth().await;
    }

    /// Validate the persisted token against the backend.
    pub async fn check_auth(&mut self) {
        let Some(token) = load_token(self.store.as_ref()) else {
            self.invalidate();
            return;
        };

        match self.api.check(&token).await {
            Ok(resp) if resp.success => {
                let Some(user) = resp.user else {
                    tracing::warn!("auth check succeeded without a user; clearing session");
                    self.invalidate();
                    return;
                };
                tracing::info!(user_id = ?user.id(), "session validated");
                self.state.send_modify(|s| {
                    s.token = Some(token);
                    s.user = Some(user.clone());
                });
                self.connect_socket(Some(&user)).await;
            }
            Ok(resp) => {
                tracing::info!(reason = ?resp.message, "session rejected by backend");
                self.invalidate();
            }
            Err(e) => {
                tracing::warn!(error = %e, "auth check failed");
                self.invalidate();
                let message = e
                    .backend_message()
                    .map_or_else(|| e.to_string(), ToOwned::to_owned);
                self.notifier.notify(Notification::error(message));
            }
        }
    }

    /// Submit credentials to `/api/auth/{mode}` and adopt the returned session.
    pub async fn login(&mut self, mode: LoginMode, credentials: &Value) {
        let result = self
            .api
            .submit_credentials(&mode, credentials)
            .await
            .and_then(accepted_login);

        let (user, token, message) = match result {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::info!(%mode, error = %e, "login failed");
                self.notifier.notify(Notification::error(e.to_string()));
                return;
            }
        };

        tracing::info!(%mode, user_id = ?user.id(), "logged in");
        self.api.set_default_token(Some(&token));
        if let Err(e) = self.store.save_token(&token) {
            tracing::warn!(error = %e, "failed to persist token");
        }
        // Observers never see a user without its token.
        self.state.send_modify(|s| {
            s.token = Some(token);
            s.user = Some(user.clone());
        });
        self.connect_socket(Some(&user)).await;
        self.notifier.notify(Notification::success(
            message.unwrap_or_else(|| LOGGED_IN_FALLBACK_MESSAGE.to_owned()),
        ));
    }

    /// Forget the session locally. No network call.
    pub fn logout(&mut self) {
        if let Err(e) = self.store.clear_token() {
            tracing::warn!(error = %e, "failed to clear persisted token");
        }
        self.state.send_modify(|s| {
            s.token = None;
            s.user = None;
            s.online_user_ids = Some(BTreeSet::new());
        });
        self.api.set_default_token(None);
        self.notifier.notify(Notification::success(LOGGED_OUT_MESSAGE));
        self.disconnect_socket();
        tracing::info!("logged out");
    }

    /// Send profile changes; on success the returned user replaces the stored one.
    pub async fn update_profile(&mut self, body: &Value) {
        match self.api.update_profile(body).await {
            Ok(resp) if resp.success => {
                let Some(user) = resp.user else {
                    let e = AuthError::MissingField("user");
                    tracing::warn!(error = %e, "profile update response incomplete");
                    self.notifier.notify(Notification::error(e.to_string()));
                    return;
                };
                self.state.send_modify(|s| s.user = Some(user));
                self.notifier
                    .notify(Notification::success(PROFILE_UPDATED_MESSAGE));
            }
            // TODO: surface `success: false` once the backend guarantees a message for it.
            Ok(resp) => {
                tracing::debug!(reason = ?resp.message, "profile update not applied");
            }
            Err(e) => {
                tracing::warn!(error = %e, "profile update failed");
                self.notifier.notify(Notification::error(e.to_string()));
            }
        }
    }

    /// Open the presence connection for `user` unless one is already open.
    pub(crate) async fn connect_socket(&mut self, user: Option<&UserProfile>) {
        let Some(user) = user else {
            return;
        };
        if self.is_connected() {
            return;
        }
        let Some(user_id) = user.id() else {
            tracing::warn!("user profile has no id; skipping realtime connection");
            return;
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let sink = Arc::new(SessionPresenceSink {
            state: Arc::clone(&self.state),
            generation,
            current: Arc::clone(&self.generation),
        });

        match self.connector.connect(&user_id, sink).await {
            Ok(connection) => {
                self.connection = Some(connection);
                self.state.send_modify(|s| s.connected = true);
            }
            Err(e) => {
                tracing::warn!(error = %e, %user_id, "realtime connection failed");
            }
        }
    }

    /// Close the presence connection, keeping the credential.
    pub fn disconnect_socket(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.disconnect();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|s| s.connected = false);
    }

    /// Drop every trace of the current credential.
    fn invalidate(&mut self) {
        if let Err(e) = self.store.clear_token() {
            tracing::warn!(error = %e, "failed to clear persisted token");
        }
        self.state.send_modify(|s| {
            s.token = None;
            s.user = None;
        });
        self.api.set_default_token(None);
        self.disconnect_socket();
    }
}

fn load_token(store: &dyn TokenStore) -> Option<String> {
    store.load_token().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to read persisted token");
        None
    })
}

fn accepted_login(
    resp: LoginResponse,
) -> Result<(UserProfile, String, Option<String>), AuthError> {
    if !resp.success {
        return Err(AuthError::Application {
            message: resp.message,
        });
    }
    let user = resp.user_data.ok_or(AuthError::MissingField("userData"))?;
    let token = resp.token.ok_or(AuthError::MissingField("token"))?;
    Ok((user, token, resp.message))
}
