// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for unit tests: in-process stub servers with call counters.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

/// Bind an ephemeral port and serve the router in the background.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

/// JSON body of a successful token response.
pub fn token_ok_body(access_token: &str, expires_in: u64) -> String {
    serde_json::json!({ "access_token": access_token, "expires_in": expires_in }).to_string()
}

/// JSON body of an OAuth-style token error.
pub fn token_err_body(error: &str, description: &str) -> String {
    serde_json::json!({ "error": error, "error_description": description }).to_string()
}

/// Stub token endpoint at `/auth/refresh`.
///
/// Serves `responses` in order (the last one repeats), counting calls, with
/// an optional artificial delay before each response.
pub async fn token_server(
    responses: Vec<(u16, String)>,
    delay: Duration,
) -> (SocketAddr, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);
    let responses = Arc::new(responses);

    let app = Router::new().route(
        "/auth/refresh",
        post(move |_body: String| {
            let calls = Arc::clone(&calls_clone);
            let responses = Arc::clone(&responses);
            async move {
                let idx = calls.fetch_add(1, Ordering::Relaxed) as usize;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let (status, body) = responses
                    .get(idx)
                    .or_else(|| responses.last())
                    .cloned()
                    .unwrap_or((500, "{}".to_owned()));
                (
                    axum::http::StatusCode::from_u16(status)
                        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                    body,
                )
            }
        }),
    );

    (serve(app).await, calls)
}
