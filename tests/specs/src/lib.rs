// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end session scenarios.
//!
//! Runs a stub of the platform API in-process (login, refresh, logout, and a
//! protected resource) and exercises a real [`satchel::SessionManager`]
//! against it over HTTP.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::Once;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;

static LOGGING: Once = Once::new();

/// Initialize tracing for tests. Safe to call from every test.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// In-process stub of the platform API.
///
/// Login and refresh mint sequential access tokens (`A1`, `A2`, …); the
/// protected resource accepts only the most recently minted one. Every
/// endpoint counts its calls.
pub struct StubPlatform {
    /// Most recently minted access token; the only one `/api/courses` accepts.
    current_token: Mutex<Option<String>>,
    token_seq: AtomicU32,
    /// When set, `/auth/refresh` answers 401 invalid_grant.
    revoke_refresh: AtomicBool,
    pub login_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub logout_calls: AtomicU32,
    pub course_calls: AtomicU32,
}

impl StubPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current_token: Mutex::new(None),
            token_seq: AtomicU32::new(0),
            revoke_refresh: AtomicBool::new(false),
            login_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            logout_calls: AtomicU32::new(0),
            course_calls: AtomicU32::new(0),
        })
    }

    /// Make every subsequent refresh fail as revoked.
    pub fn revoke_refresh_token(&self) {
        self.revoke_refresh.store(true, Ordering::Relaxed);
    }

    /// The access token the protected resource currently accepts.
    pub fn current_token(&self) -> Option<String> {
        self.current_token.lock().clone()
    }

    fn mint_token(&self) -> String {
        let n = self.token_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let token = format!("A{n}");
        *self.current_token.lock() = Some(token.clone());
        token
    }

    /// Serve the stub on an ephemeral port, returning its address.
    pub async fn spawn(self: &Arc<Self>) -> anyhow::Result<SocketAddr> {
        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/refresh", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/api/courses", get(courses))
            .with_state(Arc::clone(self));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(addr)
    }
}

async fn login(State(s): State<Arc<StubPlatform>>, body: String) -> (StatusCode, String) {
    s.login_calls.fetch_add(1, Ordering::Relaxed);

    let creds: serde_json::Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "{}".to_owned()),
    };
    if creds["password"] != "correct-horse" {
        return (
            StatusCode::UNAUTHORIZED,
            r#"{"detail":"invalid email or password"}"#.to_owned(),
        );
    }

    let token = s.mint_token();
    let body = serde_json::json!({
        "access_token": token,
        "refresh_token": "R1",
        "expires_in": 900,
        "user": { "id": 1, "email": creds["email"], "full_name": "Ada Learner", "role": "student" }
    });
    (StatusCode::OK, body.to_string())
}

async fn refresh(State(s): State<Arc<StubPlatform>>) -> (StatusCode, String) {
    s.refresh_calls.fetch_add(1, Ordering::Relaxed);

    if s.revoke_refresh.load(Ordering::Relaxed) {
        return (
            StatusCode::UNAUTHORIZED,
            r#"{"error":"invalid_grant","error_description":"refresh token revoked"}"#.to_owned(),
        );
    }

    // Small delay widens the window in which concurrent callers pile up.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let token = s.mint_token();
    let body = serde_json::json!({ "access_token": token, "expires_in": 900 });
    (StatusCode::OK, body.to_string())
}

async fn logout(State(s): State<Arc<StubPlatform>>) -> (StatusCode, String) {
    s.logout_calls.fetch_add(1, Ordering::Relaxed);
    *s.current_token.lock() = None;
    (StatusCode::OK, "{}".to_owned())
}

async fn courses(State(s): State<Arc<StubPlatform>>, headers: HeaderMap) -> (StatusCode, String) {
    s.course_calls.fetch_add(1, Ordering::Relaxed);

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let accepted = s.current_token.lock().clone();

    match (presented, accepted) {
        (Some(p), Some(a)) if p == a => (
            StatusCode::OK,
            r#"[{"id":1,"title":"Intro to Ownership"},{"id":2,"title":"Async in Anger"}]"#
                .to_owned(),
        ),
        _ => (StatusCode::UNAUTHORIZED, "{}".to_owned()),
    }
}
