// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Mission routes: follow-up goal CRUD and the auto-detection pass.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{EscalationRule, Mission, MissionStatus};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Days a sent message may sit unanswered before the detection pass
/// proposes a follow-up mission for its thread.
const DETECT_UNANSWERED_AFTER_DAYS: i64 = 3;

/// How many recent sent messages the detection pass examines.
const DETECT_SCAN_LIMIT: u32 = 200;

/// Mission routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/missions", get(list_missions).post(create_mission))
        .route(
            "/api/missions/{id}",
            get(get_mission).put(update_mission).delete(delete_mission),
        )
        .route("/api/missions/detect", post(detect_missions))
}

// ─── CRUD ────────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct CreateMissionRequest {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    #[serde(default)]
    pub success_condition: String,
    /// Deadline (RFC 3339)
    pub deadline: Option<String>,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    #[serde(default)]
    pub linked_thread_ids: Vec<String>,
}

/// Create a mission.
async fn create_mission(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateMissionRequest>,
) -> Result<Json<Mission>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if let Some(deadline) = body.deadline.as_deref() {
        chrono::DateTime::parse_from_rfc3339(deadline).map_err(|_| {
            AppError::BadRequest("Invalid 'deadline': must be RFC3339 datetime".to_string())
        })?;
    }

    let now = Utc::now().to_rfc3339();
    let mission = Mission {
        id: crate::db::generate_id(&user.email),
        owner: user.email.clone(),
        title: body.title,
        success_condition: body.success_condition,
        deadline: body.deadline,
        escalation_rules: body.escalation_rules,
        linked_thread_ids: body.linked_thread_ids,
        status: MissionStatus::Active,
        created_at: now.clone(),
        updated_at: now,
        completed_at: None,
    };

    state.db.upsert_mission(&mission).await?;

    tracing::info!(email = %user.email, mission_id = %mission.id, "Mission created");

    Ok(Json(mission))
}

#[derive(Deserialize)]
struct ListMissionsQuery {
    status: Option<MissionStatus>,
}

#[derive(Serialize)]
pub struct MissionsResponse {
    pub missions: Vec<Mission>,
}

/// List the user's missions.
async fn list_missions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListMissionsQuery>,
) -> Result<Json<MissionsResponse>> {
    let missions = state
        .db
        .get_missions_for_user(&user.email, params.status)
        .await?;

    Ok(Json(MissionsResponse { missions }))
}

/// Load a mission, verifying ownership. Foreign missions 404 rather than
/// 403 so their existence is not revealed.
async fn load_owned_mission(
    state: &AppState,
    email: &str,
    mission_id: &str,
) -> Result<Mission> {
    let mission = state
        .db
        .get_mission(mission_id)
        .await?
        .filter(|m| m.owner == email)
        .ok_or_else(|| AppError::NotFound(format!("Mission {}", mission_id)))?;
    Ok(mission)
}

/// Get a single mission.
async fn get_mission(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(mission_id): Path<String>,
) -> Result<Json<Mission>> {
    let mission = load_owned_mission(&state, &user.email, &mission_id).await?;
    Ok(Json(mission))
}

#[derive(Deserialize)]
pub struct UpdateMissionRequest {
    pub title: Option<String>,
    pub success_condition: Option<String>,
    /// Absent = unchanged; explicit null = clear the deadline
    #[serde(default, deserialize_with = "double_option")]
    pub deadline: Option<Option<String>>,
    pub escalation_rules: Option<Vec<EscalationRule>>,
    pub linked_thread_ids: Option<Vec<String>>,
    pub status: Option<MissionStatus>,
}

/// Distinguish an absent field (outer `None`) from an explicit JSON null
/// (inner `None`).
fn double_option<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    Ok(Some(Option::<String>::deserialize(deserializer)?))
}

/// Update a mission.
///
/// Marking `status=done` is idempotent: repeating the update leaves the
/// stored record unchanged (no new write, same `completed_at`).
async fn update_mission(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(mission_id): Path<String>,
    Json(body): Json<UpdateMissionRequest>,
) -> Result<Json<Mission>> {
    let mut mission = load_owned_mission(&state, &user.email, &mission_id).await?;

    // Idempotent completion: a done -> done transition with no other
    // field changes must not touch the stored record.
    let only_status_change = body.title.is_none()
        && body.success_condition.is_none()
        && body.deadline.is_none()
        && body.escalation_rules.is_none()
        && body.linked_thread_ids.is_none();

    if body.status == Some(MissionStatus::Done)
        && mission.status == MissionStatus::Done
        && only_status_change
    {
        return Ok(Json(mission));
    }

    if let Some(title) = body.title {
        if title.trim().is_empty() {
            return Err(AppError::BadRequest("title must not be empty".to_string()));
        }
        mission.title = title;
    }
    if let Some(condition) = body.success_condition {
        mission.success_condition = condition;
    }
    if let Some(deadline) = body.deadline {
        if let Some(d) = deadline.as_deref() {
            chrono::DateTime::parse_from_rfc3339(d).map_err(|_| {
                AppError::BadRequest("Invalid 'deadline': must be RFC3339 datetime".to_string())
            })?;
        }
        mission.deadline = deadline;
    }
    if let Some(rules) = body.escalation_rules {
        mission.escalation_rules = rules;
    }
    if let Some(threads) = body.linked_thread_ids {
        mission.linked_thread_ids = threads;
    }
    if let Some(status) = body.status {
        if status == MissionStatus::Done && mission.status != MissionStatus::Done {
            mission.completed_at = Some(Utc::now().to_rfc3339());
        }
        if status != MissionStatus::Done {
            mission.completed_at = None;
        }
        mission.status = status;
    }
    mission.updated_at = Utc::now().to_rfc3339();

    state.db.upsert_mission(&mission).await?;

    Ok(Json(mission))
}

#[derive(Serialize)]
pub struct DeleteMissionResponse {
    pub deleted: bool,
}

/// Delete a mission.
async fn delete_mission(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(mission_id): Path<String>,
) -> Result<Json<DeleteMissionResponse>> {
    // Ownership check before deleting
    load_owned_mission(&state, &user.email, &mission_id).await?;
    state.db.delete_mission(&mission_id).await?;

    tracing::info!(email = %user.email, mission_id = %mission_id, "Mission deleted");

    Ok(Json(DeleteMissionResponse { deleted: true }))
}

// ─── Auto-detection ──────────────────────────────────────────

#[derive(Serialize)]
pub struct DetectMissionsResponse {
    pub created: Vec<Mission>,
}

/// Detection pass: propose missions for sent messages whose thread has
/// seen no reply for a few days.
///
/// Pure conditional queries over the cached mailbox plus date comparison;
/// nothing is scheduled.
async fn detect_missions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DetectMissionsResponse>> {
    let now = Utc::now();
    let threshold = now - Duration::days(DETECT_UNANSWERED_AFTER_DAYS);

    let sent = state
        .db
        .get_emails_for_user(&user.email, Some(true), None, DETECT_SCAN_LIMIT)
        .await?;

    // Threads already tracked by an existing mission are skipped.
    let existing = state.db.get_missions_for_user(&user.email, None).await?;
    let mut tracked_threads: std::collections::HashSet<String> = existing
        .iter()
        .flat_map(|m| m.linked_thread_ids.iter().cloned())
        .collect();

    let mut created = Vec::new();

    for message in sent {
        if tracked_threads.contains(&message.thread_id) {
            continue;
        }

        let sent_at = match chrono::DateTime::parse_from_rfc3339(&message.date) {
            Ok(d) => d.with_timezone(&Utc),
            Err(_) => continue,
        };
        if sent_at > threshold {
            continue;
        }

        // Any cached non-sent message in the thread counts as a reply.
        let thread = state
            .db
            .get_thread_emails(&user.email, &message.thread_id)
            .await?;
        if thread.iter().any(|m| !m.is_sent) {
            continue;
        }

        let recipient = crate::models::CachedEmail::header_address(&message.to).to_string();
        let now_str = now.to_rfc3339();
        let mission = Mission {
            id: crate::db::generate_id(&user.email),
            owner: user.email.clone(),
            title: format!("Follow up with {}", recipient),
            success_condition: format!("Reply received on \"{}\"", message.subject),
            deadline: Some((now + Duration::days(2)).to_rfc3339()),
            escalation_rules: vec![EscalationRule {
                after_days: 0,
                action: "remind".to_string(),
            }],
            linked_thread_ids: vec![message.thread_id.clone()],
            status: MissionStatus::Active,
            created_at: now_str.clone(),
            updated_at: now_str,
            completed_at: None,
        };

        state.db.upsert_mission(&mission).await?;
        tracked_threads.insert(message.thread_id.clone());
        created.push(mission);
    }

    tracing::info!(
        email = %user.email,
        created = created.len(),
        "Mission detection pass complete"
    );

    Ok(Json(DetectMissionsResponse { created }))
}
