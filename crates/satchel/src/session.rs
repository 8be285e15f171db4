// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application-facing session façade.
//!
//! Composes the token store, refresh coordinator, and request pipeline into
//! the operations an application calls: boot-time hydration, login, logout.
//! Auth state is published over a watch channel; discrete session events
//! (refreshed, expired, logged in/out) over a broadcast channel so the
//! embedding app can route to its login surface uniformly.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::expiry;
use crate::http::ApiClient;
use crate::refresh::RefreshCoordinator;
use crate::store::{now_ms, TokenStore, UserProfile};

/// Poll interval for the auto-refresh task when there is no session to
/// keep fresh.
const AUTO_REFRESH_IDLE_POLL: Duration = Duration::from_secs(30);

/// Authentication state as seen by the UI layer.
///
/// `Optimistic` is the deliberate brief window during boot where the cached
/// session is shown before the validating refresh settles; consumers can gate
/// sensitive actions on `Confirmed` while still avoiding a loading flash.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// Boot has not run yet.
    Unknown,
    /// Cached session shown, validation still in flight.
    Optimistic(UserProfile),
    /// Session validated against the server.
    Confirmed(UserProfile),
    /// No session. The expected steady state for anonymous users.
    Unauthenticated,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Optimistic(_) | Self::Confirmed(_))
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Self::Optimistic(user) | Self::Confirmed(user) => Some(user),
            Self::Unknown | Self::Unauthenticated => None,
        }
    }
}

/// Discrete session lifecycle events.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A refresh replaced the access token.
    Refreshed,
    /// The session was terminated by a failed refresh. The embedding app
    /// decides where to navigate — there is no baked-in redirect.
    Expired { error: String },
    LoggedIn { user: UserProfile },
    LoggedOut,
}

/// Response shape of the login endpoint.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: UserProfile,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Debug snapshot of the session, including claims decoded from the token
/// itself. The decoded claims are informational only; authorization decisions
/// come from the stored expiry.
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub expires_in_secs: Option<u64>,
    pub user_email: Option<String>,
    pub token_subject: Option<String>,
    pub token_exp_claim: Option<u64>,
}

/// The session manager. Construct once per application, share by `Arc`.
pub struct SessionManager {
    config: SessionConfig,
    store: Arc<TokenStore>,
    refresher: Arc<RefreshCoordinator>,
    api: ApiClient,
    http: reqwest::Client,
    state_tx: watch::Sender<AuthState>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create a manager and subscribe to its event stream.
    pub fn new(config: SessionConfig) -> (Arc<Self>, broadcast::Receiver<SessionEvent>) {
        let (event_tx, event_rx) = broadcast::channel(64);
        let (state_tx, _state_rx) = watch::channel(AuthState::Unknown);
        let http = reqwest::Client::new();

        let store =
            Arc::new(TokenStore::new(config.persist_path.clone(), config.expiry_margin_secs));
        let refresher = Arc::new(RefreshCoordinator::new(
            config.clone(),
            Arc::clone(&store),
            http.clone(),
            event_tx.clone(),
        ));
        let api =
            ApiClient::new(config.clone(), http.clone(), Arc::clone(&store), Arc::clone(&refresher));

        let manager =
            Arc::new(Self { config, store, refresher, api, http, state_tx, event_tx });
        (manager, event_rx)
    }

    /// The request pipeline for application API calls.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// The underlying token store (mostly useful for tests and diagnostics).
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Watch the auth state. The current value is available immediately.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to discrete session events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn current_state(&self) -> AuthState {
        self.state_tx.borrow().clone()
    }

    /// Boot-time hydration. Runs once per application load, before any
    /// protected content is shown.
    ///
    /// A cached session is published optimistically first (no loading flash),
    /// then validated with one refresh when a refresh token exists. An
    /// expired access token with no usable refresh token destroys the
    /// session.
    pub async fn bootstrap(&self) -> AuthState {
        let snapshot = self.store.read();
        let (Some(_), Some(user)) = (snapshot.access_token.as_ref(), snapshot.user.clone())
        else {
            debug!("no cached session");
            self.publish(AuthState::Unauthenticated);
            return AuthState::Unauthenticated;
        };

        self.publish(AuthState::Optimistic(user.clone()));

        if snapshot.refresh_token.is_some() {
            match self.refresher.refresh().await {
                Ok(_) => {
                    info!("cached session validated");
                    self.publish(AuthState::Confirmed(user.clone()));
                    AuthState::Confirmed(user)
                }
                Err(e) => {
                    // Store already cleared by the coordinator.
                    warn!(err = %e, "cached session rejected");
                    self.publish(AuthState::Unauthenticated);
                    AuthState::Unauthenticated
                }
            }
        } else if expiry::is_expired(&snapshot) {
            debug!("cached token expired with no refresh token, clearing");
            self.store.clear();
            self.publish(AuthState::Unauthenticated);
            AuthState::Unauthenticated
        } else {
            // Nothing to validate against; stay optimistic until the token
            // ages out.
            AuthState::Optimistic(user)
        }
    }

    /// Authenticate against the login endpoint. Failures surface unmodified;
    /// there is no retry.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<UserProfile, AuthError> {
        let url = self.config.url(&self.config.login_path);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "email": identifier, "password": secret }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| AuthError::Network(e.to_string()))?;

        if status == 400 || status == 401 {
            return Err(AuthError::InvalidCredentials(body));
        }
        if !(200..300).contains(&status) {
            return Err(AuthError::Api { status, body });
        }

        let login: LoginResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::Decode(e.to_string()))?;

        let ttl = login.expires_in.unwrap_or(self.config.default_ttl_secs);
        self.store.write(
            login.access_token,
            login.refresh_token,
            Some(login.user.clone()),
            ttl,
        );
        info!(user_id = login.user.id, "logged in");
        self.publish(AuthState::Confirmed(login.user.clone()));
        let _ = self.event_tx.send(SessionEvent::LoggedIn { user: login.user.clone() });
        Ok(login.user)
    }

    /// End the session. The server call is best-effort; the local clear is
    /// unconditional and never skipped on network failure.
    pub async fn logout(&self) {
        let url = self.config.url(&self.config.logout_path);
        let token = self.store.read().access_token;

        let mut builder = self.http.post(&url);
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            builder = builder.bearer_auth(token);
        }
        match builder.send().await {
            Ok(resp) => debug!(status = resp.status().as_u16(), "logout acknowledged"),
            Err(e) => debug!(err = %e, "logout call failed, clearing locally anyway"),
        }

        self.store.clear();
        self.publish(AuthState::Unauthenticated);
        let _ = self.event_tx.send(SessionEvent::LoggedOut);
        info!("logged out");
    }

    /// Debug view of the current session.
    pub fn status(&self) -> SessionStatus {
        let snapshot = self.store.read();
        let claims = snapshot.access_token.as_deref().and_then(expiry::decode_claims);
        SessionStatus {
            authenticated: snapshot.is_authenticated(),
            expires_in_secs: snapshot
                .expires_at_ms
                .map(|at| at.saturating_sub(now_ms()) / 1000),
            user_email: snapshot.user.and_then(|u| u.email),
            token_subject: claims.as_ref().and_then(|c| c.sub.clone()),
            token_exp_claim: claims.and_then(|c| c.exp),
        }
    }

    /// Keep the access token fresh in the background.
    ///
    /// Sleeps until the stored expiry, then refreshes through the
    /// coordinator (single-flight with any concurrent 401-triggered
    /// refresh). Stops on cancellation or when refresh fails terminally.
    pub async fn run_auto_refresh(&self, shutdown: CancellationToken) {
        info!("auto-refresh task started");
        loop {
            let snapshot = self.store.read();
            let sleep_for = match (&snapshot.access_token, &snapshot.refresh_token) {
                (Some(_), Some(_)) => {
                    // expires_at_ms already carries the safety margin.
                    let wait_ms =
                        snapshot.expires_at_ms.unwrap_or(0).saturating_sub(now_ms());
                    Duration::from_millis(wait_ms)
                }
                // Nothing refreshable; poll for a session to appear.
                _ => AUTO_REFRESH_IDLE_POLL,
            };

            if !sleep_for.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = shutdown.cancelled() => {
                        info!("auto-refresh task stopped");
                        return;
                    }
                }
                continue;
            }

            match self.refresher.refresh().await {
                Ok(_) => {}
                Err(e) => {
                    warn!(err = %e, "auto-refresh terminal failure");
                    self.publish(AuthState::Unauthenticated);
                    return;
                }
            }
        }
    }

    fn publish(&self, state: AuthState) {
        // send_replace updates the value even with no subscribers.
        let _ = self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
