use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Json, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::domains::transcript::{ChatMessage, Transcript};
use crate::domains::trip::{avatar_for, TripForm};
use crate::error::{Result, TripPlannerError};
use crate::planner::TripPlanner;
use crate::services::transcript::TranscriptSink;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const DEFAULT_SESSION: &str = "default";
pub const MAX_SESSIONS: usize = 256;
pub const MAX_MESSAGES_PER_SESSION: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<TripPlanner>,
    /// Least recently used sessions are evicted first.
    pub sessions: Arc<Mutex<LruCache<String, Transcript>>>,
    max_messages: usize,
}

impl AppState {
    pub fn new(planner: TripPlanner) -> Self {
        Self::with_limits(planner, MAX_SESSIONS, MAX_MESSAGES_PER_SESSION)
    }

    /// Zero limits are raised to one.
    pub fn with_limits(planner: TripPlanner, max_sessions: usize, max_messages: usize) -> Self {
        let capacity = NonZeroUsize::new(max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            planner: Arc::new(planner),
            sessions: Arc::new(Mutex::new(LruCache::new(capacity))),
            max_messages: max_messages.max(1),
        }
    }

    async fn append_session(&self, session_id: &str, messages: Vec<ChatMessage>) -> Transcript {
        let mut sessions = self.sessions.lock().await;
        let transcript = sessions.get_or_insert_mut(session_id.to_string(), Transcript::new);
        transcript.extend(messages);
        transcript.retain_last(self.max_messages);
        transcript.clone()
    }

    async fn session(&self, session_id: &str) -> Transcript {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct PlanRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(flatten)]
    form: TripForm,
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Clone, Serialize)]
struct MessageView {
    role: String,
    content: String,
    avatar: Option<&'static str>,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.clone(),
            content: message.content.clone(),
            avatar: avatar_for(&message.role),
        }
    }
}

#[derive(Serialize)]
struct PlanResponse {
    session_id: String,
    result: String,
    messages: Vec<MessageView>,
}

#[derive(Serialize)]
struct MessagesResponse {
    session_id: String,
    messages: Vec<MessageView>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    messages: Vec<MessageView>,
}

fn session_id(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

fn views(transcript: &Transcript) -> Vec<MessageView> {
    transcript.messages().iter().map(MessageView::from).collect()
}

/// What the page shows when kickoff fails.
pub fn failure_message(err: &TripPlannerError) -> String {
    format!("An error occurred: {err}")
}

fn validation_response(err: TripPlannerError) -> Response {
    let status = if err.is_user_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let error = match err {
        TripPlannerError::Validation(message) => message,
        other => failure_message(&other),
    };
    (
        status,
        Json(ErrorResponse {
            error,
            messages: Vec::new(),
        }),
    )
        .into_response()
}

fn sse_event(payload: serde_json::Value) -> std::result::Result<Bytes, std::convert::Infallible> {
    Ok(Bytes::from(format!("data: {payload}\n\n")))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/plan", post(plan))
        .route("/plan_stream", post(plan_stream))
        .route("/messages", get(messages))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("TRIP_PLANNER_GIT_SHA").to_string(),
    })
}

async fn messages(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> impl IntoResponse {
    let session_id = session_id(query.session_id.as_deref());
    let transcript = state.session(&session_id).await;
    Json(MessagesResponse {
        session_id,
        messages: views(&transcript),
    })
}

async fn plan(State(state): State<AppState>, Json(payload): Json<PlanRequest>) -> Response {
    let session_id = session_id(payload.session_id.as_deref());
    let request = match state.planner.validate(&payload.form) {
        Ok(request) => request,
        Err(err) => return validation_response(err),
    };

    info!(session = %session_id, "Planning trip");
    let sink = TranscriptSink::new();
    let outcome = state.planner.plan(&request, &sink).await;
    let transcript = state.append_session(&session_id, sink.messages()).await;

    match outcome {
        Ok(output) => (
            StatusCode::OK,
            Json(PlanResponse {
                session_id,
                result: output.raw,
                messages: views(&transcript),
            }),
        )
            .into_response(),
        Err(err) => {
            error!(session = %session_id, error = %err, "Trip planning failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: failure_message(&err),
                    messages: views(&transcript),
                }),
            )
                .into_response()
        }
    }
}

async fn plan_stream(State(state): State<AppState>, Json(payload): Json<PlanRequest>) -> Response {
    let session_id = session_id(payload.session_id.as_deref());
    let request = match state.planner.validate(&payload.form) {
        Ok(request) => request,
        Err(err) => return validation_response(err),
    };

    info!(session = %session_id, "Planning trip (streamed)");
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatMessage>();
    let worker_state = state.clone();
    let worker_session = session_id.clone();
    // The only sender lives in this task, so `rx` closes once planning ends.
    let handle = tokio::spawn(async move {
        let sink = TranscriptSink::new().with_live(tx);
        let outcome = worker_state.planner.plan(&request, &sink).await;
        worker_state
            .append_session(&worker_session, sink.messages())
            .await;
        outcome
    });

    let body = Body::from_stream(async_stream::stream! {
        while let Some(message) = rx.recv().await {
            let view = MessageView::from(&message);
            yield sse_event(json!({"type": "message", "message": view}));
        }
        match handle.await {
            Ok(Ok(output)) => {
                yield sse_event(json!({"type": "result", "session_id": session_id, "result": output.raw}));
            }
            Ok(Err(err)) => {
                error!(session = %session_id, error = %err, "Trip planning failed");
                yield sse_event(json!({"type": "error", "error": failure_message(&err)}));
            }
            Err(join_err) => {
                warn!(session = %session_id, error = %join_err, "Planner task aborted");
                let err = TripPlannerError::Runtime(join_err.to_string());
                yield sse_event(json!({"type": "error", "error": failure_message(&err)}));
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub async fn run_with_shutdown<F>(
    host: &str,
    port: u16,
    planner: TripPlanner,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(AppState::new(planner));

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TripPlannerError::Runtime(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, "Trip planner listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| TripPlannerError::Runtime(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_session_falls_back_to_default() {
        assert_eq!(session_id(None), "default");
        assert_eq!(session_id(Some("  ")), "default");
        assert_eq!(session_id(Some(" tab-1 ")), "tab-1");
    }

    #[test]
    fn views_carry_avatars_for_known_roles() {
        let view = MessageView::from(&ChatMessage::new("Manager", "ok"));
        assert_eq!(
            view.avatar,
            Some("https://cdn-icons-png.flaticon.com/512/305/305694.png")
        );
        assert!(MessageView::from(&ChatMessage::assistant("x")).avatar.is_none());
    }

    #[test]
    fn failure_message_wraps_error() {
        let err = TripPlannerError::Http("401 Unauthorized".to_string());
        assert_eq!(
            failure_message(&err),
            "An error occurred: http error: 401 Unauthorized"
        );
    }
}
