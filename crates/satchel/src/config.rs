// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default safety margin subtracted from server-reported token lifetimes.
pub const DEFAULT_EXPIRY_MARGIN_SECS: u64 = 30;

/// Default token lifetime assumed when the server omits `expires_in`.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 900;

/// Default number of extra attempts for transport-level refresh failures.
pub const DEFAULT_REFRESH_MAX_RETRIES: u32 = 2;

/// Configuration for a [`SessionManager`](crate::SessionManager) and the
/// components underneath it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base URL of the API, without a trailing slash (e.g. `https://api.example.com`).
    pub base_url: String,
    /// Path of the login endpoint.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Path of the token refresh endpoint.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// Path of the logout endpoint.
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// Seconds subtracted from `expires_in` when computing local expiry, so a
    /// token is treated as stale slightly before the server rejects it.
    #[serde(default = "default_expiry_margin")]
    pub expiry_margin_secs: u64,
    /// Token lifetime assumed when a token response omits `expires_in`.
    #[serde(default = "default_token_ttl")]
    pub default_ttl_secs: u64,
    /// Extra refresh attempts for transport errors (server rejections are
    /// never retried).
    #[serde(default = "default_refresh_retries")]
    pub refresh_max_retries: u32,
    /// Path of the persisted session file. `None` keeps the session in memory
    /// only (it will not survive a restart).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_path: Option<PathBuf>,
}

fn default_login_path() -> String {
    "/auth/login".to_owned()
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_owned()
}

fn default_logout_path() -> String {
    "/auth/logout".to_owned()
}

fn default_expiry_margin() -> u64 {
    DEFAULT_EXPIRY_MARGIN_SECS
}

fn default_token_ttl() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

fn default_refresh_retries() -> u32 {
    DEFAULT_REFRESH_MAX_RETRIES
}

impl SessionConfig {
    /// Create a config with defaults for the given API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            login_path: default_login_path(),
            refresh_path: default_refresh_path(),
            logout_path: default_logout_path(),
            expiry_margin_secs: default_expiry_margin(),
            default_ttl_secs: default_token_ttl(),
            refresh_max_retries: default_refresh_retries(),
            persist_path: None,
        }
    }

    /// Persist the session under the default state directory.
    pub fn with_default_persistence(mut self) -> Self {
        self.persist_path = Some(state_dir().join("session.json"));
        self
    }

    /// Absolute URL for a path relative to the API base.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

/// Resolve the state directory for persisted session data.
///
/// Checks `SATCHEL_STATE_DIR`, then `$XDG_STATE_HOME/satchel`,
/// then `$HOME/.local/state/satchel`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SATCHEL_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("satchel");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/satchel");
    }
    PathBuf::from(".satchel")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
