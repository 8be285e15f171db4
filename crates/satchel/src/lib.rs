// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side session management for a remote REST API.
//!
//! Owns the full lifecycle of a bearer-token session: durable token storage,
//! expiry tracking, single-flight silent refresh, a retry-on-401 request
//! pipeline, and an application-facing session façade that publishes auth
//! state changes.

pub mod config;
pub mod error;
pub mod expiry;
pub mod http;
pub mod refresh;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::SessionConfig;
pub use error::{AuthError, RefreshError};
pub use http::{ApiClient, ApiRequest, ApiResponse};
pub use refresh::RefreshCoordinator;
pub use session::{AuthState, SessionEvent, SessionManager, SessionStatus};
pub use store::{SessionSnapshot, TokenStore, UserProfile};
