// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile routes: current user, preferences, account deletion.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::services::tasks::DeleteUserPayload;
use crate::AppState;
use axum::{
    extract::State,
    routing::{delete, get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Profile routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/profile", put(update_profile))
        .route("/api/account", delete(delete_account))
}

// ─── Current User ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
pub struct MeResponse {
    pub email: String,
    pub name: String,
    pub username: String,
    pub onboarding_completed: bool,
    pub preferences: HashMap<String, String>,
    pub integrations: crate::models::Integrations,
    pub profile_picture: Option<String>,
    /// Opaque analytics id, regenerated after its TTL elapses
    pub visitor_id: String,
    pub deletion_requested_at: Option<String>,
}

/// Get current user profile.
///
/// The profile picture is served from the in-process TTL cache and only
/// re-fetched from Google once the cached entry has expired.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let user_record = state
        .db
        .get_user(&user.email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.email)))?;

    let profile = state
        .db
        .get_profile(&user.email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user.email)))?;

    let profile_picture = match state.avatar_cache.get(&user.email) {
        Some(url) => Some(url),
        None => {
            // Cache expired or cold: refresh from Google, fall back to the
            // stored record if the fetch fails.
            match state.gmail_service.fetch_profile_picture(&user.email).await {
                Ok(Some(url)) => {
                    state.avatar_cache.insert(&user.email, url.clone());
                    Some(url)
                }
                Ok(None) => user_record.profile_picture.clone(),
                Err(e) => {
                    tracing::debug!(error = %e, "Profile picture refresh failed, using stored");
                    user_record.profile_picture.clone()
                }
            }
        }
    };

    let visitor_id = state.visitor_ids.get_or_generate(&user.email);

    Ok(Json(MeResponse {
        email: user_record.email,
        name: user_record.name,
        username: profile.username,
        onboarding_completed: profile.onboarding_completed,
        preferences: profile.preferences,
        integrations: profile.integrations,
        profile_picture,
        visitor_id,
        deletion_requested_at: user_record.deletion_requested_at,
    }))
}

// ─── Profile Update ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub onboarding_completed: Option<bool>,
    /// Merged into the existing preference bag
    #[serde(default)]
    pub preferences: HashMap<String, String>,
    pub integrations: Option<crate::models::Integrations>,
}

/// Update the session user's profile.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<crate::models::Profile>> {
    let mut profile = state
        .db
        .get_profile(&user.email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user.email)))?;

    if let Some(username) = body.username {
        let username = username.trim().to_string();
        if username.is_empty() {
            return Err(AppError::BadRequest("username must not be empty".to_string()));
        }
        profile.username = username;
    }
    if let Some(done) = body.onboarding_completed {
        profile.onboarding_completed = done;
    }
    for (key, value) in body.preferences {
        profile.preferences.insert(key, value);
    }
    if let Some(integrations) = body.integrations {
        profile.integrations = integrations;
    }
    profile.updated_at = chrono::Utc::now().to_rfc3339();

    state.db.set_profile(&profile).await?;

    tracing::info!(email = %user.email, "Profile updated");

    Ok(Json(profile))
}

// ─── Account Deletion ────────────────────────────────────────

/// Response for account deletion.
#[derive(Serialize)]
pub struct DeleteAccountResponse {
    pub success: bool,
    pub message: String,
}

/// Delete user's account and all associated data (GDPR compliance).
///
/// This queues a deletion task and returns immediately.
/// The task will:
/// 1. Delete tokens from DB and revoke the Google grant
/// 2. Delete all user data from Firestore
async fn delete_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeleteAccountResponse>> {
    tracing::info!(email = %user.email, "User-initiated account deletion");

    // Mark user as pending deletion (for UI feedback).
    // We fetch-modify-write to preserve other fields.
    if let Some(mut user_record) = state.db.get_user(&user.email).await? {
        user_record.deletion_requested_at = Some(chrono::Utc::now().to_rfc3339());
        state.db.upsert_user(&user_record).await?;
    } else {
        // User already gone? Rare but possible. Queue the task anyway in
        // case tokens or other documents remain.
        tracing::warn!(email = %user.email, "User record not found during deletion request");
    }

    let payload = DeleteUserPayload {
        email: user.email.clone(),
        source: "user_request".to_string(),
    };

    state
        .tasks_service
        .queue_delete_user(&state.config.api_url, payload)
        .await?;

    Ok(Json(DeleteAccountResponse {
        success: true,
        message: "Account deletion initiated. All data will be removed.".to_string(),
    }))
}
