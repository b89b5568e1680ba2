// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI assistance routes: reply drafting, note generation, SSE streaming.
//!
//! All routes here are mounted behind the subscription gate.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::CachedEmail;
use crate::services::ai::ChatMessage;
use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use validator::Validate;

/// AI routes (require authentication and an active subscription).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ai/reply", post(generate_reply))
        .route("/api/ai/note", post(generate_note))
        .route("/api/ai/reply/stream", get(stream_reply))
}

const REPLY_SYSTEM_PROMPT: &str = "You are an email assistant. Draft a reply to the \
     email below on behalf of the user. Match the sender's register, keep it \
     concise, and do not invent facts. Return only the reply body.";

const NOTE_SYSTEM_PROMPT: &str = "You are an email assistant. Summarize the email \
     below as a short actionable note for the user: key points, asks, and \
     deadlines. Return only the note.";

/// Build the user-side prompt from a cached message.
fn email_prompt(email: &CachedEmail, tone: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(tone) = tone {
        prompt.push_str(&format!("Desired tone: {}\n\n", tone));
    }
    prompt.push_str(&format!(
        "From: {}\nTo: {}\nSubject: {}\n\n{}",
        email.from, email.to, email.subject, email.snippet
    ));
    prompt
}

async fn load_email(state: &AppState, owner: &str, message_id: &str) -> Result<CachedEmail> {
    state
        .db
        .get_email(owner, message_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Message {}", message_id)))
}

// ─── Reply ───────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct ReplyRequest {
    #[validate(length(min = 1, message = "message_id must not be empty"))]
    pub message_id: String,
    /// Optional tone hint ("formal", "friendly", ...)
    #[serde(default)]
    pub tone: Option<String>,
}

#[derive(Serialize)]
pub struct ReplyResponse {
    pub reply: String,
}

/// Generate a reply draft for a cached message.
async fn generate_reply(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ReplyRequest>,
) -> Result<Json<ReplyResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let email = load_email(&state, &user.email, &body.message_id).await?;

    let reply = state
        .ai_service
        .complete(vec![
            ChatMessage::system(REPLY_SYSTEM_PROMPT),
            ChatMessage::user(email_prompt(&email, body.tone.as_deref())),
        ])
        .await?;

    Ok(Json(ReplyResponse { reply }))
}

// ─── Note ────────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct NoteRequest {
    #[validate(length(min = 1, message = "message_id must not be empty"))]
    pub message_id: String,
}

#[derive(Serialize)]
pub struct NoteResponse {
    pub note: String,
}

/// Generate a summarizing note for a cached message.
async fn generate_note(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<NoteRequest>,
) -> Result<Json<NoteResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let email = load_email(&state, &user.email, &body.message_id).await?;

    let note = state
        .ai_service
        .complete(vec![
            ChatMessage::system(NOTE_SYSTEM_PROMPT),
            ChatMessage::user(email_prompt(&email, None)),
        ])
        .await?;

    Ok(Json(NoteResponse { note }))
}

// ─── Streaming ───────────────────────────────────────────────

#[derive(Deserialize)]
struct StreamReplyQuery {
    message_id: String,
    #[serde(default)]
    tone: Option<String>,
}

/// Stream a reply draft as Server-Sent Events.
///
/// Emits `delta` events carrying text chunks, then a final `done` event.
/// Provider errors after the stream has started are reported as an
/// `error` event (the HTTP status is already committed by then).
async fn stream_reply(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<StreamReplyQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    if params.message_id.is_empty() {
        return Err(AppError::BadRequest("message_id must not be empty".to_string()));
    }

    let email = load_email(&state, &user.email, &params.message_id).await?;

    let deltas = state
        .ai_service
        .stream(vec![
            ChatMessage::system(REPLY_SYSTEM_PROMPT),
            ChatMessage::user(email_prompt(&email, params.tone.as_deref())),
        ])
        .await?;

    let events = deltas
        .map(|delta| {
            let event = match delta {
                Ok(text) => Event::default().event("delta").data(text),
                Err(e) => {
                    tracing::error!(error = %e, "AI stream error mid-response");
                    Event::default().event("error").data("stream_error")
                }
            };
            Ok(event)
        })
        .chain(stream::once(async {
            Ok::<Event, Infallible>(Event::default().event("done").data(""))
        }));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
