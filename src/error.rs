// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Google authorization required")]
    ReauthRequired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Subscription required")]
    SubscriptionRequired,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Gmail API error: {0}")]
    GmailApi(String),

    #[error("AI provider error: {0}")]
    AiApi(String),

    #[error("TTS provider error: {0}")]
    TtsApi(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Marker string used for Gmail/OAuth token failures that require
    /// the user to re-authenticate (revoked or invalid refresh token).
    pub const GMAIL_TOKEN_ERROR: &'static str = "Token expired or revoked";

    /// Whether this error means the stored Google grant is unusable.
    pub fn is_gmail_token_error(&self) -> bool {
        match self {
            AppError::ReauthRequired => true,
            AppError::GmailApi(msg) => {
                msg.contains(Self::GMAIL_TOKEN_ERROR) || msg.contains("invalid_grant")
            }
            _ => false,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::ReauthRequired => (
                StatusCode::UNAUTHORIZED,
                "reauth_required",
                Some("Reconnect your Google account to continue".to_string()),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::SubscriptionRequired => {
                (StatusCode::FORBIDDEN, "subscription_required", None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            // Upstream provider failures surface as generic 500s; the
            // revoked-grant case is mapped to ReauthRequired before it gets here.
            AppError::GmailApi(msg) => {
                tracing::error!(error = %msg, "Gmail API error");
                (StatusCode::INTERNAL_SERVER_ERROR, "gmail_error", None)
            }
            AppError::AiApi(msg) => {
                tracing::error!(error = %msg, "AI provider error");
                (StatusCode::INTERNAL_SERVER_ERROR, "ai_error", None)
            }
            AppError::TtsApi(msg) => {
                tracing::error!(error = %msg, "TTS provider error");
                (StatusCode::INTERNAL_SERVER_ERROR, "tts_error", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
