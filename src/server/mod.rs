//! HTTP surface: the streaming chat endpoint plus session and status routes
//!
//! ```text
//! POST /api/chat                       → text/event-stream of agent events
//! GET  /api/sessions                   → stored session summaries
//! GET  /api/sessions/:session_id       → one stored session
//! POST /api/sessions/:session_id/close → release both environments
//! GET  /api/status                     → pool and limiter state
//! GET  /metrics                        → Prometheus text format
//! GET  /health                         → ok
//! ```

pub mod rate_limit;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use rate_limit::RateLimiter;

use crate::agent::{AgentController, AgentRequest, UploadedFile};
use crate::emitter::{self, sse_frames};
use crate::llm::{Message, Role};
use crate::metrics::{self, ERRORS_TOTAL, REQUESTS_IN_FLIGHT, REQUESTS_TOTAL};
use crate::mode::Mode;
use crate::sandbox::EnvironmentPool;
use crate::storage::{best_effort, is_valid_id, ChatStore, StoreError, StoredMessage};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AgentController>,
    pub pool: Arc<EnvironmentPool>,
    pub store: Arc<dyn ChatStore>,
    pub rate_limiter: Arc<RateLimiter>,
}

/// One prior turn as the client sends it
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub mode: Mode,
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub files: Vec<UploadedFile>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub live_environments: usize,
    pub environments: Vec<String>,
    pub rate_limited_sessions: usize,
    pub max_iterations: usize,
}

#[derive(Serialize)]
struct CloseResponse {
    released: usize,
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:session_id", get(load_session))
        .route("/api/sessions/:session_id/close", post(close_session))
        .route("/api/status", get(status))
        .route("/metrics", get(prometheus_metrics))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn reject(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Response {
    ERRORS_TOTAL.with_label_values(&[kind]).inc();
    (status, message.into()).into_response()
}

/// Stream one agent run for one configuration
async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    if request.messages.is_empty() {
        return reject(StatusCode::BAD_REQUEST, "invalid_request", "messages must not be empty");
    }
    if !is_valid_id(&request.session_id) {
        return reject(StatusCode::BAD_REQUEST, "invalid_request", "invalid session_id");
    }

    let turn = request.messages.iter().filter(|m| m.role == Role::User).count();
    if let Err(wait) = state
        .rate_limiter
        .try_acquire(&request.session_id, request.mode, turn)
    {
        let retry_after = wait.as_secs().max(1);
        warn!(session_id = %request.session_id, turn, "Rate limited chat request");
        ERRORS_TOTAL.with_label_values(&["rate_limited"]).inc();
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            "Rate limited",
        )
            .into_response();
    }

    let ChatRequest {
        session_id,
        mode,
        messages,
        files,
    } = request;

    REQUESTS_TOTAL.with_label_values(&[mode.as_str()]).inc();
    info!(
        session_id = %session_id,
        mode = %mode,
        turns = messages.len(),
        files = files.len(),
        "Chat request"
    );

    let persisted = persist_request(&state.store, &session_id, mode, &messages, &files);

    let history = messages
        .into_iter()
        .map(|m| match m.role {
            Role::User => Message::user(m.content),
            Role::Assistant => Message::assistant(m.content),
        })
        .collect();
    let agent_request = AgentRequest {
        history,
        mode,
        session_id: session_id.clone(),
        files,
    };

    let (sink, events) = emitter::channel();
    let controller = state.controller.clone();
    let store = state.store.clone();

    REQUESTS_IN_FLIGHT.inc();
    tokio::spawn(async move {
        let outcome = controller.run(agent_request, &sink).await;
        drop(sink);
        REQUESTS_IN_FLIGHT.dec();

        // assistant turn lands after the user turn it answers
        let _ = persisted.await;
        if !outcome.transcript.is_empty() {
            best_effort("append_message", async move {
                store
                    .append_message(&session_id, StoredMessage::assistant(mode, outcome.transcript))
                    .await
            });
        }
    });

    Sse::new(sse_frames(events))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Record the session, the latest user turn and uploads in the background
fn persist_request(
    store: &Arc<dyn ChatStore>,
    session_id: &str,
    mode: Mode,
    messages: &[InboundMessage],
    files: &[UploadedFile],
) -> tokio::task::JoinHandle<()> {
    let store = store.clone();
    let session_id = session_id.to_string();
    let title = messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default();
    let latest_user = messages
        .last()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.clone());
    let uploads: Vec<(String, Vec<u8>)> = files
        .iter()
        .filter_map(|f| match BASE64.decode(f.content.trim()) {
            Ok(bytes) => Some((f.name.clone(), bytes)),
            Err(_) => None,
        })
        .collect();

    best_effort("persist_request", async move {
        store.upsert_session(&session_id, &title).await?;
        if let Some(content) = latest_user {
            store
                .append_message(&session_id, StoredMessage::user(mode, content))
                .await?;
        }
        for (name, bytes) in uploads {
            store.store_upload(&session_id, &name, &bytes).await?;
        }
        Ok::<(), StoreError>(())
    })
}

fn store_error_response(e: StoreError) -> Response {
    match e {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        StoreError::InvalidId(_) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        _ => reject(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

async fn list_sessions(State(state): State<AppState>) -> Response {
    match state.store.list().await {
        Ok(sessions) => Json(sessions).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn load_session(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.store.load(&session_id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// Release the environments of both configurations
async fn close_session(State(state): State<AppState>, Path(session_id): Path<String>) -> impl IntoResponse {
    let released = state.pool.release_session(&session_id).await;
    state.rate_limiter.forget(&session_id);
    info!(session_id = %session_id, released, "Session closed");
    Json(CloseResponse { released })
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.pool.stats().await;
    Json(StatusResponse {
        live_environments: stats.live_count,
        environments: stats.keys.iter().map(ToString::to_string).collect(),
        rate_limited_sessions: state.rate_limiter.tracked_sessions(),
        max_iterations: state.controller.config().max_iterations,
    })
}

async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_text(),
    )
}

async fn health() -> &'static str {
    "ok"
}
