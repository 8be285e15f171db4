// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the session subsystem.
//!
//! The store and expiry oracle are total and never raise; only the refresh
//! coordinator and the request pipeline produce caller-visible failures, and
//! both fail closed (the session is cleared) rather than leaving it in an
//! ambiguous state.

use std::fmt;

/// Outcome of a token refresh attempt.
///
/// `Clone` because a single settlement fans out to every caller queued on the
/// in-flight refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token is stored. Terminal: any stale access token has
    /// been cleared, the caller must treat the session as gone.
    NoSession,
    /// The server rejected the refresh token (invalid/expired/revoked).
    /// Terminal: the session has been cleared.
    Rejected(String),
    /// Transport-level failure talking to the refresh endpoint, after any
    /// bounded retries. Fails closed: the session has been cleared.
    Network(String),
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSession => f.write_str("no session: refresh token unavailable"),
            Self::Rejected(msg) => write!(f, "refresh rejected: {msg}"),
            Self::Network(msg) => write!(f, "refresh network failure: {msg}"),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Errors surfaced by [`ApiClient`](crate::ApiClient) and
/// [`SessionManager`](crate::SessionManager).
#[derive(Debug)]
pub enum AuthError {
    /// Login rejected by the server. Surfaced verbatim, never retried.
    InvalidCredentials(String),
    /// The request failed with 401 and could not be recovered by a refresh.
    Unauthorized { refresh: RefreshError },
    /// The server answered with a non-success, non-401 status.
    Api { status: u16, body: String },
    /// Transport-level failure on the request itself.
    Network(String),
    /// A response body did not have the expected shape.
    Decode(String),
}

impl AuthError {
    /// HTTP status associated with this error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::InvalidCredentials(_) | Self::Unauthorized { .. } => Some(401),
            Self::Api { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) => None,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials(msg) => write!(f, "invalid credentials: {msg}"),
            Self::Unauthorized { refresh } => {
                write!(f, "unauthorized (session not recoverable: {refresh})")
            }
            Self::Api { status, body } => write!(f, "api error {status}: {body}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<RefreshError> for AuthError {
    fn from(refresh: RefreshError) -> Self {
        Self::Unauthorized { refresh }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
