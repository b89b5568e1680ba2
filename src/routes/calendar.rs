// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar recommendation route.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::services::calendar::{recommend_slots, RecommendedSlot};
use crate::AppState;
use axum::{extract::State, routing::post, Extension, Json, Router};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Calendar routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/calendar/recommendations", post(recommendations))
}

#[derive(Deserialize, Validate)]
pub struct RecommendationsRequest {
    #[validate(range(min = 15, max = 480, message = "duration_minutes must be 15-480"))]
    pub duration_minutes: u32,
    /// Days ahead to search (default 7)
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

fn default_window_days() -> u32 {
    7
}

const MAX_WINDOW_DAYS: u32 = 30;

#[derive(Serialize)]
pub struct RecommendationsResponse {
    pub slots: Vec<RecommendedSlot>,
}

/// Recommend open meeting slots from the user's primary calendar.
async fn recommendations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<RecommendationsRequest>,
) -> Result<Json<RecommendationsResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let window_days = body.window_days.clamp(1, MAX_WINDOW_DAYS);
    let window_start = Utc::now();
    let window_end = window_start + Duration::days(window_days as i64);

    // Calendar shares the Gmail token lifecycle (same Google grant).
    let access_token = state
        .gmail_service
        .get_valid_access_token(&user.email)
        .await?;

    let busy = state
        .calendar_service
        .free_busy(&access_token, window_start, window_end)
        .await
        .map_err(|e| {
            if e.is_gmail_token_error() {
                AppError::ReauthRequired
            } else {
                e
            }
        })?;

    let slots = recommend_slots(&busy, window_start, window_days, body.duration_minutes);

    tracing::debug!(
        email = %user.email,
        busy_intervals = busy.len(),
        slots = slots.len(),
        "Calendar recommendations computed"
    );

    Ok(Json(RecommendationsResponse { slots }))
}
