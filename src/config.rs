//! Client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;

use crate::error::ConfigError;

pub const BACKEND_URL_VAR: &str = "CHAT_BACKEND_URL";
pub const STORAGE_PATH_VAR: &str = "CHAT_STORAGE_PATH";
pub const REQUEST_TIMEOUT_VAR: &str = "CHAT_REQUEST_TIMEOUT_SECS";
pub const CONNECT_TIMEOUT_VAR: &str = "CHAT_CONNECT_TIMEOUT_SECS";

pub const DEFAULT_STORAGE_PATH: &str = ".chat-session/storage.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Backend origin without a trailing slash, e.g. `http://localhost:5000`.
    pub backend_url: String,
    /// File backing the persisted token store.
    pub storage_path: PathBuf,
    pub timeouts: RequestTimeouts,
}

impl SessionConfig {
    /// Config for `backend_url` with default storage path and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBackendUrl`] unless the URL is http(s).
    pub fn new(backend_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            backend_url: normalize_backend_url(backend_url)?,
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            timeouts: RequestTimeouts::default(),
        })
    }

    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `CHAT_BACKEND_URL`
    ///
    /// Optional:
    /// - `CHAT_STORAGE_PATH`: default `.chat-session/storage.json`
    /// - `CHAT_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CHAT_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the backend URL is missing or not http(s).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (env, CLI flags, tests).
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup(BACKEND_URL_VAR)
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing(BACKEND_URL_VAR))?;
        let storage_path = lookup(STORAGE_PATH_VAR)
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH), PathBuf::from);
        let timeouts = RequestTimeouts {
            request_secs: parse_u64(lookup(REQUEST_TIMEOUT_VAR), DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_u64(lookup(CONNECT_TIMEOUT_VAR), DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self {
            backend_url: normalize_backend_url(&raw_url)?,
            storage_path,
            timeouts,
        })
    }
}

fn normalize_backend_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_owned())
    } else {
        Err(ConfigError::InvalidBackendUrl(raw.to_owned()))
    }
}

fn parse_u64(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
