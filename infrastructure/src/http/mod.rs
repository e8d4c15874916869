//! Callback HTTP surface
//!
//! The inbound half of every pause/resume in the system:
//!
//! - `GET /auth/{provider}/{grant}/callback` — the provider (or the human,
//!   for token-paste flows) lands here; `state` carries the operation id and
//!   `token`/`code`/`error` carries the result.
//! - `POST /sandbox/scripts/{operation_id}/done` — a sandboxed page reports
//!   its captured output here.
//! - `GET /sandbox/scripts/{operation_id}` — serves the rendered sandbox
//!   page out of the [`PageStore`].
//!
//! Every response carries cross-origin-isolation headers so the in-page
//! interpreter's shared-memory features are permitted.
//!
//! Handlers run on whatever runtime worker accepted the connection; they
//! only ever *resolve* pending operations — the waiters are parked
//! elsewhere and are woken through the registry.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use toolgate_application::{OperationOutcome, PendingOperations};
use toolgate_domain::RuntimeOutput;
use tracing::{debug, info, warn};

/// Fixed success page shown after a callback lands.
const SUCCESS_PAGE: &str = "<!DOCTYPE html>\n<html><head><title>toolgate</title></head>\
<body><h1>Authorization received</h1>\
<p>You can close this tab and return to your agent.</p></body></html>";

/// Fixed failure page for callbacks that reference no live operation.
const FAILURE_PAGE: &str = "<!DOCTYPE html>\n<html><head><title>toolgate</title></head>\
<body><h1>Authorization failed</h1>\
<p>This link is no longer valid. Ask your agent for a fresh one.</p></body></html>";

/// Rendered sandbox pages, keyed by operation id.
///
/// The browser runtime inserts a page before navigating to it and removes
/// it after the run completes, so entries live exactly as long as their
/// operation.
#[derive(Debug, Default)]
pub struct PageStore {
    pages: Mutex<HashMap<String, String>>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, operation_id: impl Into<String>, html: String) {
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operation_id.into(), html);
    }

    pub fn get(&self, operation_id: &str) -> Option<String> {
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(operation_id)
            .cloned()
    }

    pub fn remove(&self, operation_id: &str) -> Option<String> {
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(operation_id)
    }
}

/// Shared state for the callback surface.
#[derive(Clone)]
pub struct AppState {
    pub pending: Arc<PendingOperations>,
    pub pages: Arc<PageStore>,
}

/// Query parameters of the auth callback.
#[derive(Debug, Deserialize)]
struct AuthCallbackQuery {
    state: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Build the callback router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/{provider}/{grant}/callback", get(auth_callback))
        .route("/sandbox/scripts/{operation_id}/done", post(sandbox_done))
        .route("/sandbox/scripts/{operation_id}", get(sandbox_page))
        .layer(middleware::from_fn(cross_origin_isolation))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Callback surface listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(state)).await
}

/// Force cross-origin-isolation headers onto every response.
async fn cross_origin_isolation(request: axum::extract::Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "Cross-Origin-Opener-Policy",
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        "Cross-Origin-Embedder-Policy",
        HeaderValue::from_static("credentialless"),
    );
    response
}

/// `GET /auth/{provider}/{grant}/callback`
///
/// Resolves the operation named by `state`. A denied consent arrives as
/// `error=..` and is delivered as a failure outcome — resolved into the
/// slot, never thrown. Retried callbacks hit the registry's idempotent
/// resolve and still see the success page.
async fn auth_callback(
    State(state): State<AppState>,
    Path((provider, grant)): Path<(String, String)>,
    Query(query): Query<AuthCallbackQuery>,
) -> impl IntoResponse {
    let outcome = if let Some(error) = query.error {
        OperationOutcome::Failed(error)
    } else if let Some(value) = query.token.or(query.code) {
        OperationOutcome::Delivered(serde_json::Value::String(value))
    } else {
        OperationOutcome::Failed("callback carried neither token nor code".to_string())
    };

    match state.pending.resolve(&query.state, outcome) {
        Ok(()) => {
            debug!(
                "Callback: resolved operation {} for {}/{}",
                query.state, provider, grant
            );
            (StatusCode::OK, Html(SUCCESS_PAGE)).into_response()
        }
        Err(e) => {
            warn!("Callback: {}", e);
            (StatusCode::NOT_FOUND, Html(FAILURE_PAGE)).into_response()
        }
    }
}

/// `POST /sandbox/scripts/{operation_id}/done`
///
/// The body is the page's captured output; it deserializes straight into
/// [`RuntimeOutput`]. Delivered as-is — script failures travel in the
/// `error` field, not as a transport failure.
async fn sandbox_done(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
    axum::Json(output): axum::Json<RuntimeOutput>,
) -> impl IntoResponse {
    let payload = match serde_json::to_value(&output) {
        Ok(value) => value,
        Err(e) => {
            warn!("Sandbox done: failed to re-serialize output: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    match state
        .pending
        .resolve(&operation_id, OperationOutcome::Delivered(payload))
    {
        Ok(()) => {
            debug!("Sandbox done: resolved operation {}", operation_id);
            StatusCode::NO_CONTENT
        }
        Err(e) => {
            warn!("Sandbox done: {}", e);
            StatusCode::NOT_FOUND
        }
    }
}

/// `GET /sandbox/scripts/{operation_id}` — serve the rendered page.
async fn sandbox_page(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> impl IntoResponse {
    match state.pages.get(&operation_id) {
        Some(html) => (StatusCode::OK, Html(html)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    async fn spawn_server(state: AppState) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        addr
    }

    fn state() -> AppState {
        AppState {
            pending: Arc::new(PendingOperations::new()),
            pages: Arc::new(PageStore::new()),
        }
    }

    #[tokio::test]
    async fn test_auth_callback_resolves_operation() {
        let state = state();
        let slot = state.pending.create("op-1", StdHashMap::new());
        let addr = spawn_server(state).await;

        let url = format!(
            "http://{}/auth/github-token/token/callback?state=op-1&token=abc",
            addr
        );
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("Authorization received"));

        match slot.wait().await {
            OperationOutcome::Delivered(value) => assert_eq!(value, serde_json::json!("abc")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auth_callback_error_delivers_failure() {
        let state = state();
        let slot = state.pending.create("op-1", StdHashMap::new());
        let addr = spawn_server(state).await;

        let url = format!(
            "http://{}/auth/slack/oauth2/callback?state=op-1&error=access_denied",
            addr
        );
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);

        assert!(matches!(
            slot.wait().await,
            OperationOutcome::Failed(m) if m == "access_denied"
        ));
    }

    #[tokio::test]
    async fn test_auth_callback_unknown_state_is_not_found() {
        let addr = spawn_server(state()).await;

        let url = format!("http://{}/auth/slack/oauth2/callback?state=ghost&code=x", addr);
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 404);
        assert!(response.text().await.unwrap().contains("Authorization failed"));
    }

    #[tokio::test]
    async fn test_retried_callback_keeps_first_value() {
        let state = state();
        let slot = state.pending.create("op-1", StdHashMap::new());
        let addr = spawn_server(state).await;

        let first = format!(
            "http://{}/auth/github-token/token/callback?state=op-1&token=first",
            addr
        );
        let second = format!(
            "http://{}/auth/github-token/token/callback?state=op-1&token=second",
            addr
        );
        assert_eq!(reqwest::get(&first).await.unwrap().status(), 200);
        // A slow retry of the same callback must not error or overwrite
        assert_eq!(reqwest::get(&second).await.unwrap().status(), 200);

        match slot.wait().await {
            OperationOutcome::Delivered(value) => assert_eq!(value, serde_json::json!("first")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sandbox_done_round_trip() {
        let state = state();
        let slot = state.pending.create("op-9", StdHashMap::new());
        let addr = spawn_server(state).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/sandbox/scripts/op-9/done", addr))
            .json(&serde_json::json!({"stdout": "42\n", "stderr": "", "error": null}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 204);

        match slot.wait().await {
            OperationOutcome::Delivered(value) => {
                let output: RuntimeOutput = serde_json::from_value(value).unwrap();
                assert_eq!(output.stdout, "42\n");
                assert!(!output.is_error());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sandbox_page_served_with_isolation_headers() {
        let state = state();
        state.pages.insert("op-5", "<html>sandbox</html>".to_string());
        let addr = spawn_server(state).await;

        let response = reqwest::get(format!("http://{}/sandbox/scripts/op-5", addr))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response
                .headers()
                .get("cross-origin-opener-policy")
                .and_then(|v| v.to_str().ok()),
            Some("same-origin")
        );
        assert_eq!(
            response
                .headers()
                .get("cross-origin-embedder-policy")
                .and_then(|v| v.to_str().ok()),
            Some("credentialless")
        );
        assert!(response.text().await.unwrap().contains("sandbox"));

        let missing = reqwest::get(format!("http://{}/sandbox/scripts/nope", addr))
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }
}
