// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Mail routes: cached mailbox reads, attachment passthrough, sending.

use crate::db::firestore::EmailQueryCursor;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::CachedEmail;
use crate::services::gmail::build_rfc2822;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const MAX_PER_PAGE: u32 = 100;
const CURSOR_PARTS: usize = 2;

/// Mail routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/mail/messages", get(list_messages))
        .route("/api/mail/messages/{id}", get(get_message))
        .route(
            "/api/mail/messages/{id}/attachments/{attachment_id}",
            get(get_attachment),
        )
        .route("/api/mail/send", post(send_message))
}

// ─── Listing ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct MessagesQuery {
    /// Only sent (true) or only received (false) messages
    sent: Option<bool>,
    /// Cursor for forward pagination (opaque token).
    cursor: Option<String>,
    /// Pagination: items per page
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_per_page() -> u32 {
    50
}

/// Decoded pagination cursor.
#[derive(Debug)]
struct ParsedCursor {
    date: String,
    message_id: String,
}

fn parse_cursor(cursor: Option<&str>) -> Result<Option<ParsedCursor>> {
    cursor
        .map(|raw| {
            let invalid_cursor =
                || AppError::BadRequest("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let decoded_str = std::str::from_utf8(&decoded).map_err(|_| invalid_cursor())?;

            let parts: Vec<&str> = decoded_str.splitn(CURSOR_PARTS, '|').collect();
            if parts.len() != CURSOR_PARTS || parts[0].is_empty() || parts[1].is_empty() {
                return Err(invalid_cursor());
            }

            chrono::DateTime::parse_from_rfc3339(parts[0]).map_err(|_| invalid_cursor())?;

            Ok(ParsedCursor {
                date: parts[0].to_string(),
                message_id: parts[1].to_string(),
            })
        })
        .transpose()
}

fn encode_cursor(date: &str, message_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}|{}", date, message_id))
}

#[derive(Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageSummary>,
    pub per_page: u32,
    pub next_cursor: Option<String>,
}

#[derive(Serialize, Clone, Debug)]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub snippet: String,
    pub date: String,
    pub is_sent: bool,
}

impl From<CachedEmail> for MessageSummary {
    fn from(email: CachedEmail) -> Self {
        Self {
            id: email.message_id,
            thread_id: email.thread_id,
            from: email.from,
            to: email.to,
            subject: email.subject,
            snippet: email.snippet,
            date: email.date,
            is_sent: email.is_sent,
        }
    }
}

/// List the user's cached messages, newest first.
async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>> {
    tracing::debug!(
        email = %user.email,
        sent = ?params.sent,
        cursor = ?params.cursor,
        "Fetching cached messages"
    );

    let limit = params.per_page.min(MAX_PER_PAGE).max(1);
    let cursor = parse_cursor(params.cursor.as_deref())?;

    // Fetch one extra row to decide whether another page exists. The date
    // filter is inclusive, so rows at/before the cursor pair are dropped here.
    let fetch_limit = limit.saturating_add(1).saturating_add(
        if cursor.is_some() { limit } else { 0 },
    );

    let mut results = state
        .db
        .get_emails_for_user(
            &user.email,
            params.sent,
            cursor.as_ref().map(|c| EmailQueryCursor {
                date: &c.date,
                message_id: &c.message_id,
            }),
            fetch_limit,
        )
        .await?;

    if let Some(cursor) = &cursor {
        // Keep only rows that sort strictly after the cursor position
        // in (date desc, message_id desc) order.
        results.retain(|m| {
            (m.date.as_str(), m.message_id.as_str())
                < (cursor.date.as_str(), cursor.message_id.as_str())
        });
    }

    let has_more = results.len() > limit as usize;
    if has_more {
        results.truncate(limit as usize);
    }

    let next_cursor = if has_more {
        results
            .last()
            .map(|m| encode_cursor(&m.date, &m.message_id))
    } else {
        None
    };

    let messages: Vec<MessageSummary> = results.into_iter().map(MessageSummary::from).collect();

    Ok(Json(MessagesResponse {
        messages,
        per_page: limit,
        next_cursor,
    }))
}

// ─── Single Message ──────────────────────────────────────────

/// Get a single cached message.
async fn get_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(message_id): Path<String>,
) -> Result<Json<MessageSummary>> {
    let email = state
        .db
        .get_email(&user.email, &message_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Message {}", message_id)))?;

    Ok(Json(MessageSummary::from(email)))
}

// ─── Attachments ─────────────────────────────────────────────

#[derive(Deserialize)]
struct AttachmentQuery {
    /// Content type to serve the bytes with (from the message metadata)
    mime_type: Option<String>,
    /// Filename for the Content-Disposition header
    filename: Option<String>,
}

/// Fetch attachment bytes live from Gmail and pass them through.
async fn get_attachment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((message_id, attachment_id)): Path<(String, String)>,
    Query(params): Query<AttachmentQuery>,
) -> Result<impl IntoResponse> {
    let bytes = state
        .gmail_service
        .get_attachment(&user.email, &message_id, &attachment_id)
        .await?;

    let content_type = params
        .mime_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let disposition = format!(
        "attachment; filename=\"{}\"",
        params
            .filename
            .unwrap_or_else(|| "attachment".to_string())
            .replace('"', "")
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

// ─── Sending ─────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(email(message = "to must be a valid email address"))]
    pub to: String,
    #[validate(length(min = 1, max = 998, message = "subject must not be empty"))]
    pub subject: String,
    #[validate(length(min = 1, message = "body must not be empty"))]
    pub body: String,
    /// RFC 2822 Message-ID being replied to, if any
    #[serde(default)]
    pub in_reply_to: Option<String>,
}

#[derive(Serialize)]
pub struct SendResponse {
    pub id: String,
    pub thread_id: String,
}

/// Send a message via Gmail on behalf of the session user.
async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let raw = build_rfc2822(
        &user.email,
        &body.to,
        &body.subject,
        &body.body,
        body.in_reply_to.as_deref(),
    );

    let sent = state.gmail_service.send_message(&user.email, &raw).await?;

    tracing::info!(
        email = %user.email,
        message_id = %sent.id,
        "Message sent"
    );

    Ok(Json(SendResponse {
        id: sent.id,
        thread_id: sent.thread_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip() {
        let encoded = encode_cursor("2026-01-05T12:00:00Z", "abc123");
        let decoded = parse_cursor(Some(&encoded)).unwrap().unwrap();

        assert_eq!(decoded.date, "2026-01-05T12:00:00Z");
        assert_eq!(decoded.message_id, "abc123");
    }

    #[test]
    fn test_cursor_rejects_invalid_input() {
        let err = parse_cursor(Some("!!not-base64!!")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let bad_date = URL_SAFE_NO_PAD.encode("yesterday|abc123");
        let err = parse_cursor(Some(&bad_date)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let missing_part = URL_SAFE_NO_PAD.encode("2026-01-05T12:00:00Z");
        let err = parse_cursor(Some(&missing_part)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_no_cursor_is_none() {
        assert!(parse_cursor(None).unwrap().is_none());
    }
}
