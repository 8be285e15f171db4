// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight token refresh.
//!
//! At most one refresh network call is outstanding system-wide. The first
//! caller to request a refresh while idle issues the call; every caller that
//! arrives while it is in flight is queued and settled with the same outcome.
//! On failure the session is cleared — there is no partial-failure state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::RefreshError;
use crate::session::SessionEvent;
use crate::store::TokenStore;

/// Initial backoff between transport-failure retries.
const INITIAL_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Backoff ceiling between transport-failure retries.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Refresh state machine. `Refreshing` holds the callers suspended on the
/// in-flight network call; the queue never outlives a single refresh cycle.
enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<oneshot::Sender<Result<String, RefreshError>>> },
}

/// Response shape of the token refresh endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Error shape of the token refresh endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Serializes all refresh activity for one session.
pub struct RefreshCoordinator {
    config: SessionConfig,
    store: Arc<TokenStore>,
    http: reqwest::Client,
    state: Mutex<RefreshState>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl RefreshCoordinator {
    pub fn new(
        config: SessionConfig,
        store: Arc<TokenStore>,
        http: reqwest::Client,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self { config, store, http, state: Mutex::new(RefreshState::Idle), event_tx }
    }

    /// Obtain a freshly refreshed access token.
    ///
    /// Exactly one caller per expiry event performs the network call; the
    /// rest suspend and receive its outcome. With no refresh token stored
    /// this fails immediately without a network call, clearing whatever
    /// stale token remains.
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let rx = {
            let mut state = self.state.lock();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                RefreshState::Idle => {
                    let snapshot = self.store.read();
                    if snapshot.refresh_token.is_none() {
                        // A stale access token with no way to renew it is a
                        // terminal failure: end the session, same as a
                        // rejected refresh.
                        if snapshot.access_token.is_some() {
                            warn!("no refresh token for stale session, clearing");
                            self.store.clear();
                            let _ = self.event_tx.send(SessionEvent::Expired {
                                error: RefreshError::NoSession.to_string(),
                            });
                        }
                        return Err(RefreshError::NoSession);
                    }
                    *state = RefreshState::Refreshing { waiters: Vec::new() };
                    None
                }
            }
        };

        // Queued caller: suspend until the in-flight refresh settles.
        if let Some(rx) = rx {
            debug!("joining in-flight refresh");
            return match rx.await {
                Ok(outcome) => outcome,
                // Leader dropped mid-flight; settled by its guard.
                Err(_) => Err(RefreshError::Network("refresh abandoned".to_owned())),
            };
        }

        // Leader: run the refresh, then settle every queued waiter with the
        // same outcome. The guard keeps waiters from hanging if this future
        // is dropped at an await point.
        let guard = SettleGuard { coordinator: self };
        let outcome = self.execute().await;
        guard.settle(outcome.clone());
        outcome
    }

    /// Perform the refresh call (with bounded retries for transport errors),
    /// then commit or clear the store.
    async fn execute(&self) -> Result<String, RefreshError> {
        let Some(refresh_token) = self.store.read().refresh_token else {
            return Err(RefreshError::NoSession);
        };

        let mut backoff = INITIAL_RETRY_BACKOFF;
        let mut attempt = 0u32;
        let outcome = loop {
            match self.do_refresh(&refresh_token).await {
                Ok(token) => break Ok(token),
                Err(e @ RefreshError::Network(_)) if attempt < self.config.refresh_max_retries => {
                    attempt += 1;
                    debug!(attempt, err = %e, "refresh transport failure, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
                }
                Err(e) => break Err(e),
            }
        };

        match outcome {
            Ok(token) => {
                let ttl = token.expires_in.unwrap_or(self.config.default_ttl_secs);
                self.store.write(token.access_token.clone(), token.refresh_token, None, ttl);
                info!("access token refreshed");
                let _ = self.event_tx.send(SessionEvent::Refreshed);
                Ok(token.access_token)
            }
            Err(e) => {
                // Fail closed: a session that cannot refresh is terminated.
                warn!(err = %e, "refresh failed, clearing session");
                self.store.clear();
                let _ = self.event_tx.send(SessionEvent::Expired { error: e.to_string() });
                Err(e)
            }
        }
    }

    /// One network round trip to the refresh endpoint.
    async fn do_refresh(&self, refresh_token: &str) -> Result<TokenResponse, RefreshError> {
        let url = self.config.url(&self.config.refresh_path);
        let resp = self
            .http
            .post(&url)
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await
            .map_err(|e| RefreshError::Network(format!("HTTP error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RefreshError::Network(format!("read body: {e}")))?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| RefreshError::Network(format!("malformed token response: {e}")));
        }

        // Server-side rejection is terminal; everything else is transport.
        if status.is_client_error() {
            let msg = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => err.error_description.unwrap_or(err.error),
                Err(_) => format!("HTTP {status}"),
            };
            return Err(RefreshError::Rejected(msg));
        }
        Err(RefreshError::Network(format!("HTTP {status}: {body}")))
    }

    /// Drain the waiter queue and return to idle, handing `outcome` to every
    /// queued caller.
    fn settle_waiters(&self, outcome: &Result<String, RefreshError>) {
        let waiters = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => Vec::new(),
            }
        };
        for tx in waiters {
            let _ = tx.send(outcome.clone());
        }
    }
}

/// Settles the queue exactly once, including when the leading refresh future
/// is dropped before completion.
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
}

impl SettleGuard<'_> {
    fn settle(self, outcome: Result<String, RefreshError>) {
        self.coordinator.settle_waiters(&outcome);
        std::mem::forget(self);
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        self.coordinator
            .settle_waiters(&Err(RefreshError::Network("refresh abandoned".to_owned())));
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
