// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Text-to-speech route. Audio bytes are passed through unmodified.
//!
//! Mounted behind the subscription gate.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::AppState;
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

/// TTS routes (require authentication and an active subscription).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/tts", post(synthesize))
}

#[derive(Deserialize, Validate)]
pub struct TtsRequest {
    #[validate(length(min = 1, max = 5000, message = "text must be 1-5000 characters"))]
    pub text: String,
    #[serde(default)]
    pub voice_id: Option<String>,
}

/// Synthesize narration audio for the given text.
async fn synthesize(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<TtsRequest>,
) -> Result<impl IntoResponse> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let audio = state
        .tts_service
        .synthesize(&body.text, body.voice_id.as_deref())
        .await?;

    tracing::info!(
        email = %user.email,
        bytes = audio.bytes.len(),
        "TTS narration synthesized"
    );

    Ok(([(header::CONTENT_TYPE, audio.content_type)], audio.bytes))
}
