//! REST calls against the backend auth endpoints.
//!
//! SYSTEM CONTEXT
//! ==============
//! `SessionController` talks to the backend only through [`AuthApi`], so the
//! controller can be driven by a scripted fake in tests and by
//! [`HttpAuthApi`] in real clients.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx statuses become [`AuthError::Status`] carrying the `message` from
//! the JSON body when there is one. A 2xx body with `success: false` is NOT an
//! error at this layer; the caller decides what a structured failure means.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::types::{CheckResponse, LoginMode, LoginResponse, UpdateProfileResponse};

pub const CHECK_PATH: &str = "/api/auth/check";
pub const UPDATE_PROFILE_PATH: &str = "/api/auth/update-profile";

/// Path for a credential submission, e.g. `/api/auth/login`.
///
/// # Errors
///
/// Returns [`AuthError::InvalidMode`] unless the mode is a plain route name.
pub fn credentials_path(mode: &LoginMode) -> Result<String, AuthError> {
    if !mode.is_routable() {
        return Err(AuthError::InvalidMode(mode.to_string()));
    }
    Ok(format!("/api/auth/{}", mode.as_path_segment()))
}

/// Backend auth surface plus the default bearer credential attached to calls.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// Replace (or with `None`, remove) the default bearer credential.
    fn set_default_token(&self, token: Option<&str>);

    /// Current default bearer credential.
    fn default_token(&self) -> Option<String>;

    /// `GET /api/auth/check` with `token` as the bearer credential.
    async fn check(&self, token: &str) -> Result<CheckResponse, AuthError>;

    /// `POST /api/auth/{mode}` with the credentials body.
    async fn submit_credentials(
        &self,
        mode: &LoginMode,
        credentials: &Value,
    ) -> Result<LoginResponse, AuthError>;

    /// `PUT /api/auth/update-profile` with the default credential.
    async fn update_profile(&self, body: &Value) -> Result<UpdateProfileResponse, AuthError>;
}

/// `reqwest`-backed [`AuthApi`].
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
    default_token: RwLock<Option<String>>,
}

impl HttpAuthApi {
    /// Build a client for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &SessionConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.backend_url.clone(),
            default_token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Request against any backend path carrying the default bearer
    /// credential, for chat endpoints beyond the auth routes.
    #[must_use]
    pub fn authorized(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, self.url(path));
        match self.default_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AuthError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.json::<Value>().await.unwrap_or(Value::Null);
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned);
            tracing::debug!(status = status.as_u16(), ?message, "auth request rejected");
            return Err(AuthError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait::async_trait]
impl AuthApi for HttpAuthApi {
    fn set_default_token(&self, token: Option<&str>) {
        let mut guard = self
            .default_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = token.map(ToOwned::to_owned);
    }

    fn default_token(&self) -> Option<String> {
        self.default_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn check(&self, token: &str) -> Result<CheckResponse, AuthError> {
        let request = self.client.get(self.url(CHECK_PATH)).bearer_auth(token);
        self.send(request).await
    }

    async fn submit_credentials(
        &self,
        mode: &LoginMode,
        credentials: &Value,
    ) -> Result<LoginResponse, AuthError> {
        let request = self
            .authorized(Method::POST, &credentials_path(mode)?)
            .json(credentials);
        self.send(request).await
    }

    async fn update_profile(&self, body: &Value) -> Result<UpdateProfileResponse, AuthError> {
        let request = self.authorized(Method::PUT, UPDATE_PROFILE_PATH).json(body);
        self.send(request).await
    }
}
