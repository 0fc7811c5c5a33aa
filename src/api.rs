//! HTTP surface for medchat.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /chat` – Run one turn and return the reply with the session transcript.
//! - `POST /chat/stream` – Same turn, streamed as newline-delimited JSON fragments.
//! - `GET /sessions` – List live session ids.
//! - `GET /sessions/:id/history` – Memory contents and transcript of one session.
//! - `POST /sessions/:id/clear` – Forget a session's history but keep the session.
//! - `DELETE /sessions/:id` – Drop a session.
//! - `POST /ingest` – Re-ingest the configured PDF folder into the vector index.
//! - `GET /metrics` – Ingestion and chat counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::app::ChatApi;
use crate::ingest::IngestError;
use crate::memory::{ChatMessage, Role};
use crate::metrics::MetricsSnapshot;
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Build the HTTP router exposing the chat API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ChatApi + 'static,
{
    Router::new()
        .route("/chat", post(chat::<S>))
        .route("/chat/stream", post(chat_stream::<S>))
        .route("/sessions", get(list_sessions::<S>))
        .route("/sessions/:id/history", get(session_history::<S>))
        .route("/sessions/:id/clear", post(clear_session::<S>))
        .route("/sessions/:id", delete(remove_session::<S>))
        .route("/ingest", post(ingest::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the chat endpoints.
#[derive(Deserialize)]
struct ChatRequest {
    /// Conversation key; a fresh id is generated when omitted.
    #[serde(default)]
    session_id: Option<String>,
    /// The user's utterance. Empty text gets the greeting.
    #[serde(default)]
    message: String,
}

impl ChatRequest {
    fn into_parts(self) -> (String, String) {
        let session_id = self
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        (session_id, self.message)
    }
}

#[derive(Serialize)]
struct TranscriptEntry {
    user: String,
    bot: String,
}

fn transcript_entries(transcript: Vec<(String, String)>) -> Vec<TranscriptEntry> {
    transcript
        .into_iter()
        .map(|(user, bot)| TranscriptEntry { user, bot })
        .collect()
}

/// Success response for `POST /chat`.
#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    reply: String,
    transcript: Vec<TranscriptEntry>,
}

async fn chat<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse>
where
    S: ChatApi,
{
    let (session_id, message) = request.into_parts();
    let transcript = service.chat(&session_id, &message).await;
    let reply = transcript
        .last()
        .map(|(_, bot)| bot.clone())
        .unwrap_or_default();
    Json(ChatResponse {
        session_id,
        reply,
        transcript: transcript_entries(transcript),
    })
}

/// Stream a reply as NDJSON: one `{"session_id", "token"}` object per fragment, then
/// `{"session_id", "done": true}`.
async fn chat_stream<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ChatRequest>,
) -> Response
where
    S: ChatApi + 'static,
{
    let (session_id, message) = request.into_parts();
    let lines = async_stream::stream! {
        let mut fragments = service.chat_stream(&session_id, &message);
        while let Some(token) = fragments.next().await {
            yield Ok::<_, Infallible>(ndjson_line(&json!({
                "session_id": session_id,
                "token": token,
            })));
        }
        yield Ok(ndjson_line(&json!({ "session_id": session_id, "done": true })));
    };

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response()
}

fn ndjson_line(value: &serde_json::Value) -> String {
    format!("{value}\n")
}

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<String>,
}

async fn list_sessions<S>(State(service): State<Arc<S>>) -> Json<SessionsResponse>
where
    S: ChatApi,
{
    Json(SessionsResponse {
        sessions: service.session_ids(),
    })
}

#[derive(Serialize)]
struct MessageView {
    role: &'static str,
    content: String,
    timestamp: String,
}

impl From<ChatMessage> for MessageView {
    fn from(message: ChatMessage) -> Self {
        let timestamp = message
            .timestamp
            .format(&Rfc3339)
            .unwrap_or_else(|_| message.timestamp.unix_timestamp().to_string());
        Self {
            role: match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: message.content,
            timestamp,
        }
    }
}

/// Response body for `GET /sessions/:id/history`.
#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    history: String,
    messages: Vec<MessageView>,
    transcript: Vec<TranscriptEntry>,
}

async fn session_history<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError>
where
    S: ChatApi,
{
    let snapshot = service
        .session(&session_id)
        .await
        .ok_or_else(|| AppError::SessionNotFound(session_id.clone()))?;
    Ok(Json(HistoryResponse {
        session_id,
        history: snapshot.history,
        messages: snapshot.messages.into_iter().map(MessageView::from).collect(),
        transcript: transcript_entries(snapshot.transcript),
    }))
}

async fn clear_session<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, AppError>
where
    S: ChatApi,
{
    if service.clear_session(&session_id).await {
        tracing::info!(session_id = %session_id, "Session cleared");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::SessionNotFound(session_id))
    }
}

async fn remove_session<S>(
    State(service): State<Arc<S>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, AppError>
where
    S: ChatApi,
{
    if service.remove_session(&session_id) {
        tracing::info!(session_id = %session_id, "Session removed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::SessionNotFound(session_id))
    }
}

/// Success response for `POST /ingest`.
#[derive(Serialize)]
struct IngestResponse {
    documents: usize,
    chunks: usize,
    upserted: usize,
}

/// Re-run PDF ingestion. Fresh ids are generated, so repeated runs add duplicate vectors.
async fn ingest<S>(State(service): State<Arc<S>>) -> Result<Json<IngestResponse>, AppError>
where
    S: ChatApi,
{
    let outcome = service.ingest().await?;
    tracing::info!(
        documents = outcome.documents,
        chunks = outcome.chunks,
        upserted = outcome.upserted,
        "Ingest request completed"
    );
    Ok(Json(IngestResponse {
        documents: outcome.documents,
        chunks: outcome.chunks,
        upserted: outcome.upserted,
    }))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: ChatApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/chat",
                description: "Answer a message using the session's history and retrieved documents. Response returns { \"session_id\", \"reply\", \"transcript\" }.",
                request_example: Some(json!({
                    "session_id": "patient-42",
                    "message": "I have a headache and fever"
                })),
            },
            CommandDescriptor {
                name: "chat_stream",
                method: "POST",
                path: "/chat/stream",
                description: "Same as chat, streamed as newline-delimited JSON token objects.",
                request_example: Some(json!({
                    "session_id": "patient-42",
                    "message": "What should I eat?"
                })),
            },
            CommandDescriptor {
                name: "list_sessions",
                method: "GET",
                path: "/sessions",
                description: "Return the ids of live chat sessions.",
                request_example: None,
            },
            CommandDescriptor {
                name: "session_history",
                method: "GET",
                path: "/sessions/:id/history",
                description: "Return the memory contents and transcript of one session.",
                request_example: None,
            },
            CommandDescriptor {
                name: "clear_session",
                method: "POST",
                path: "/sessions/:id/clear",
                description: "Forget a session's history while keeping the session.",
                request_example: None,
            },
            CommandDescriptor {
                name: "remove_session",
                method: "DELETE",
                path: "/sessions/:id",
                description: "Drop a session and its memory.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ingest",
                method: "POST",
                path: "/ingest",
                description: "Load, chunk, embed, and upsert the configured PDF folder.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and chat counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    Ingest(IngestError),
    SessionNotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Ingest(error) => {
                tracing::error!(error = %error, "Ingest request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
            }
            Self::SessionNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Unknown session '{id}'")).into_response()
            }
        }
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        Self::Ingest(inner)
    }
}
