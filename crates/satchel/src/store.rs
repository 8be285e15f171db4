// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable session storage: access/refresh tokens, user profile, and the
//! locally computed expiry instant.
//!
//! The in-memory snapshot is authoritative; when a persist path is configured
//! the snapshot is mirrored to a JSON file with atomic tmp-file+rename writes.
//! A corrupt or partially-shaped file on load is treated as "no session",
//! never an error.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Last known profile of the signed-in user.
///
/// Server fields this client does not model are carried in `extra` so a
/// persist/reload round trip does not drop them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Point-in-time view of the stored session. Every field is independently
/// present-or-absent; `expires_at_ms` is only ever written alongside
/// `access_token`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    /// Expiry as milliseconds since the Unix epoch, computed from the
    /// server-reported lifetime minus the configured safety margin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl SessionSnapshot {
    /// An access token on hand means the session is authenticated, regardless
    /// of the other fields.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Store for the four session fields.
///
/// All operations are total: nothing here returns a recoverable error.
/// Writes swap in a fully computed snapshot, so a reader never observes an
/// access token without its expiry (or any other torn combination).
pub struct TokenStore {
    inner: RwLock<SessionSnapshot>,
    persist_path: Option<PathBuf>,
    expiry_margin_secs: u64,
}

impl TokenStore {
    /// Create a store, loading any previously persisted session from
    /// `persist_path`.
    pub fn new(persist_path: Option<PathBuf>, expiry_margin_secs: u64) -> Self {
        let snapshot = persist_path.as_deref().map(load_snapshot).unwrap_or_default();
        Self { inner: RwLock::new(snapshot), persist_path, expiry_margin_secs }
    }

    /// In-memory store with the default margin, for tests and embedders that
    /// do not want persistence.
    pub fn in_memory() -> Self {
        Self::new(None, crate::config::DEFAULT_EXPIRY_MARGIN_SECS)
    }

    /// Write a freshly issued access token.
    ///
    /// The refresh token and user profile are replaced only when provided;
    /// `None` keeps the prior value. Expiry is computed as
    /// `now + ttl_secs − margin` and committed together with the token.
    pub fn write(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        user: Option<UserProfile>,
        ttl_secs: u64,
    ) {
        let margin_ms = self.expiry_margin_secs * 1000;
        let expires_at_ms = (now_ms() + ttl_secs * 1000).saturating_sub(margin_ms);

        let snapshot = {
            let mut inner = self.inner.write();
            inner.access_token = Some(access_token);
            inner.expires_at_ms = Some(expires_at_ms);
            if refresh_token.is_some() {
                inner.refresh_token = refresh_token;
            }
            if user.is_some() {
                inner.user = user;
            }
            inner.clone()
        };

        self.persist(&snapshot);
    }

    /// Replace only the user profile (e.g. after a profile edit).
    pub fn write_user(&self, user: UserProfile) {
        let snapshot = {
            let mut inner = self.inner.write();
            inner.user = Some(user);
            inner.clone()
        };
        self.persist(&snapshot);
    }

    /// Current snapshot of all four fields.
    pub fn read(&self) -> SessionSnapshot {
        self.inner.read().clone()
    }

    /// Remove every session field.
    pub fn clear(&self) {
        *self.inner.write() = SessionSnapshot::default();
        self.persist(&SessionSnapshot::default());
    }

    /// Mirror the snapshot to disk, if configured. Failures are logged and
    /// swallowed: persistence is best-effort, the in-memory session stays
    /// authoritative.
    fn persist(&self, snapshot: &SessionSnapshot) {
        let Some(ref path) = self.persist_path else {
            return;
        };
        if let Err(e) = save_snapshot(path, snapshot) {
            warn!(path = %path.display(), err = %e, "failed to persist session");
        }
    }
}

/// Load a persisted snapshot, normalizing any shape the invariants forbid.
fn load_snapshot(path: &std::path::Path) -> SessionSnapshot {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) => {
            debug!(path = %path.display(), "no persisted session: {e}");
            return SessionSnapshot::default();
        }
    };

    let mut snapshot: SessionSnapshot = match serde_json::from_str(&data) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), "corrupt persisted session, discarding: {e}");
            return SessionSnapshot::default();
        }
    };

    // An expiry without its token is a torn record; drop the expiry.
    if snapshot.access_token.is_none() {
        snapshot.expires_at_ms = None;
    }
    snapshot
}

/// Save a snapshot atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves racing on
/// the same `.tmp` file cannot leave trailing bytes from a longer previous
/// write.
fn save_snapshot(path: &std::path::Path, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
