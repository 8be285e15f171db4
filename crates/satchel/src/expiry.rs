// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token expiry decision and a debug-only claims decoder.

use base64::Engine as _;
use serde::Deserialize;

use crate::store::{now_ms, SessionSnapshot};

/// Whether the snapshot's access token should be treated as expired.
///
/// Decides purely from the locally persisted expiry; a session that never
/// recorded one is expired (fail-closed). The token itself is not inspected.
pub fn is_expired(snapshot: &SessionSnapshot) -> bool {
    match snapshot.expires_at_ms {
        Some(expires_at_ms) => expires_at_ms <= now_ms(),
        None => true,
    }
}

/// Claims of interest from a JWT payload.
///
/// Debug surface only: the authorization decision is [`is_expired`], which
/// never looks inside the token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    /// Token expiry claim, epoch seconds.
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub iat: Option<u64>,
}

/// Best-effort decode of a JWT's payload segment. Returns `None` for
/// anything that is not a well-formed three-segment token.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    let _signature = segments.next()?;
    if segments.next().is_some() {
        return None;
    }

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
#[path = "expiry_tests.rs"]
mod tests;
