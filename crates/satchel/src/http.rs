// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request pipeline.
//!
//! Wraps every request/response pair with bearer-token handling: attaches the
//! stored access token on the way out, and on a 401 runs one coordinated
//! refresh and re-issues the request exactly once. Non-401 responses pass
//! through untouched.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::AuthError;
use crate::refresh::RefreshCoordinator;
use crate::store::TokenStore;

/// A replayable request description. Kept as plain data so the retry after a
/// refresh can rebuild the request byte-for-byte.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), json: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.json = Some(value),
            Err(e) => debug!(err = %e, "request body failed to serialize, omitting it"),
        }
        self
    }
}

/// Response surfaced by the pipeline: the final status and body after any
/// refresh-and-retry, with the usual decode helper.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        serde_json::from_str(&self.body).map_err(|e| AuthError::Decode(e.to_string()))
    }
}

/// API client that owns the retry-on-401 behavior. Call sites never deal
/// with tokens or refreshes.
pub struct ApiClient {
    config: SessionConfig,
    http: reqwest::Client,
    store: Arc<TokenStore>,
    refresher: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(
        config: SessionConfig,
        http: reqwest::Client,
        store: Arc<TokenStore>,
        refresher: Arc<RefreshCoordinator>,
    ) -> Self {
        Self { config, http, store, refresher }
    }

    /// Send a request through the pipeline.
    ///
    /// Any response status other than 401 is returned as-is. A 401 triggers
    /// one coordinated refresh and one retry; a second 401 is surfaced
    /// without further retries, so the pipeline terminates even under
    /// persistent server-side 401s. An unrecoverable refresh maps to
    /// [`AuthError::Unauthorized`] — the session has already been cleared.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        let token = self.store.read().access_token;
        let response = self.issue(request, token.as_deref()).await?;
        if response.status != 401 {
            return Ok(response);
        }

        debug!(path = %request.path, "request unauthorized, attempting refresh");
        match self.refresher.refresh().await {
            Ok(new_token) => {
                // Exactly one retry, with the refreshed token. Whatever comes
                // back — including another 401 — is the caller's to handle.
                self.issue(request, Some(&new_token)).await
            }
            Err(refresh) => Err(AuthError::Unauthorized { refresh }),
        }
    }

    /// Send and decode a 2xx JSON response; non-success statuses become
    /// [`AuthError::Api`].
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, AuthError> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(AuthError::Api { status: response.status, body: response.body });
        }
        response.json()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        self.send_json(&ApiRequest::get(path)).await
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: impl Serialize,
    ) -> Result<T, AuthError> {
        self.send_json(&ApiRequest::post(path).json(body)).await
    }

    /// One network round trip. The bearer header is attached only when a
    /// non-empty token is on hand; a missing token means no header at all.
    async fn issue(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, AuthError> {
        let url = self.config.url(&request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.json {
            builder = builder.json(body);
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await.map_err(|e| AuthError::Network(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
