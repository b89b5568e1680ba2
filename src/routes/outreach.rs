// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Outreach routes: campaign/template/contact CRUD and the tracking pixel.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Campaign, CampaignContact, CampaignStatus, OutreachTemplate};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Fixed 1x1 transparent GIF served by the tracking pixel.
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

/// Outreach routes (require authentication via JWT).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/api/campaigns/{id}",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route(
            "/api/campaigns/{id}/contacts",
            get(list_contacts).post(add_contact),
        )
        .route("/api/templates", get(list_templates).post(create_template))
        .route(
            "/api/templates/{id}",
            get(get_template).delete(delete_template),
        )
}

/// Public tracking pixel route (no auth; hit from recipients' mail clients).
pub fn pixel_routes() -> Router<Arc<AppState>> {
    Router::new().route("/t/{campaign_id}/{contact_id}/open.gif", get(tracking_pixel))
}

// ─── Campaigns ───────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct CreateCampaignRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "template_id must not be empty"))]
    pub template_id: String,
    /// Days to wait before each follow-up stage
    #[serde(default)]
    pub follow_up_days: Vec<u32>,
}

/// Create a campaign (in draft status).
async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateCampaignRequest>,
) -> Result<Json<Campaign>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    // The template must exist and belong to the user
    state
        .db
        .get_template(&body.template_id)
        .await?
        .filter(|t| t.owner == user.email)
        .ok_or_else(|| AppError::NotFound(format!("Template {}", body.template_id)))?;

    let now = Utc::now().to_rfc3339();
    let campaign = Campaign {
        id: crate::db::generate_id(&user.email),
        owner: user.email.clone(),
        name: body.name,
        template_id: body.template_id,
        follow_up_days: body.follow_up_days,
        status: CampaignStatus::Draft,
        created_at: now.clone(),
        updated_at: now,
    };

    state.db.upsert_campaign(&campaign).await?;

    tracing::info!(email = %user.email, campaign_id = %campaign.id, "Campaign created");

    Ok(Json(campaign))
}

#[derive(Serialize)]
pub struct CampaignsResponse {
    pub campaigns: Vec<Campaign>,
}

/// List the user's campaigns.
async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<CampaignsResponse>> {
    let campaigns = state.db.get_campaigns_for_user(&user.email).await?;
    Ok(Json(CampaignsResponse { campaigns }))
}

/// Load a campaign, verifying ownership.
async fn load_owned_campaign(
    state: &AppState,
    email: &str,
    campaign_id: &str,
) -> Result<Campaign> {
    state
        .db
        .get_campaign(campaign_id)
        .await?
        .filter(|c| c.owner == email)
        .ok_or_else(|| AppError::NotFound(format!("Campaign {}", campaign_id)))
}

/// Get a single campaign.
async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(campaign_id): Path<String>,
) -> Result<Json<Campaign>> {
    let campaign = load_owned_campaign(&state, &user.email, &campaign_id).await?;
    Ok(Json(campaign))
}

#[derive(Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub template_id: Option<String>,
    pub follow_up_days: Option<Vec<u32>>,
    pub status: Option<CampaignStatus>,
}

/// Update a campaign (rename, retarget template, pause/activate).
async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(campaign_id): Path<String>,
    Json(body): Json<UpdateCampaignRequest>,
) -> Result<Json<Campaign>> {
    let mut campaign = load_owned_campaign(&state, &user.email, &campaign_id).await?;

    if let Some(name) = body.name {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("name must not be empty".to_string()));
        }
        campaign.name = name;
    }
    if let Some(template_id) = body.template_id {
        state
            .db
            .get_template(&template_id)
            .await?
            .filter(|t| t.owner == user.email)
            .ok_or_else(|| AppError::NotFound(format!("Template {}", template_id)))?;
        campaign.template_id = template_id;
    }
    if let Some(days) = body.follow_up_days {
        campaign.follow_up_days = days;
    }
    if let Some(status) = body.status {
        campaign.status = status;
    }
    campaign.updated_at = Utc::now().to_rfc3339();

    state.db.upsert_campaign(&campaign).await?;

    Ok(Json(campaign))
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// Delete a campaign.
async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(campaign_id): Path<String>,
) -> Result<Json<DeletedResponse>> {
    load_owned_campaign(&state, &user.email, &campaign_id).await?;
    state.db.delete_campaign(&campaign_id).await?;

    tracing::info!(email = %user.email, campaign_id = %campaign_id, "Campaign deleted");

    Ok(Json(DeletedResponse { deleted: true }))
}

// ─── Contacts ────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct AddContactRequest {
    #[validate(email(message = "email_address must be a valid email address"))]
    pub email_address: String,
    #[serde(default)]
    pub name: String,
}

/// Add a contact to a campaign.
async fn add_contact(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(campaign_id): Path<String>,
    Json(body): Json<AddContactRequest>,
) -> Result<Json<CampaignContact>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    load_owned_campaign(&state, &user.email, &campaign_id).await?;

    let contact = CampaignContact {
        id: crate::db::generate_id(&campaign_id),
        campaign_id: campaign_id.clone(),
        owner: user.email.clone(),
        email_address: body.email_address,
        name: body.name,
        stage: 0,
        last_contacted_at: None,
        opened_at: None,
        replied: false,
        status: "active".to_string(),
    };

    state.db.upsert_contact(&contact).await?;

    Ok(Json(contact))
}

#[derive(Serialize)]
pub struct ContactsResponse {
    pub contacts: Vec<CampaignContact>,
}

/// List a campaign's contacts.
async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(campaign_id): Path<String>,
) -> Result<Json<ContactsResponse>> {
    load_owned_campaign(&state, &user.email, &campaign_id).await?;
    let contacts = state.db.get_contacts_for_campaign(&campaign_id).await?;
    Ok(Json(ContactsResponse { contacts }))
}

// ─── Templates ───────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 998, message = "subject must not be empty"))]
    pub subject: String,
    #[validate(length(min = 1, message = "body must not be empty"))]
    pub body: String,
}

/// Create a template.
async fn create_template(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateTemplateRequest>,
) -> Result<Json<OutreachTemplate>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let template = OutreachTemplate {
        id: crate::db::generate_id(&user.email),
        owner: user.email.clone(),
        name: body.name,
        subject: body.subject,
        body: body.body,
        created_at: Utc::now().to_rfc3339(),
    };

    state.db.upsert_template(&template).await?;

    Ok(Json(template))
}

#[derive(Serialize)]
pub struct TemplatesResponse {
    pub templates: Vec<OutreachTemplate>,
}

/// List the user's templates.
async fn list_templates(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TemplatesResponse>> {
    let templates = state.db.get_templates_for_user(&user.email).await?;
    Ok(Json(TemplatesResponse { templates }))
}

/// Get a single template.
async fn get_template(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(template_id): Path<String>,
) -> Result<Json<OutreachTemplate>> {
    let template = state
        .db
        .get_template(&template_id)
        .await?
        .filter(|t| t.owner == user.email)
        .ok_or_else(|| AppError::NotFound(format!("Template {}", template_id)))?;
    Ok(Json(template))
}

/// Delete a template.
async fn delete_template(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(template_id): Path<String>,
) -> Result<Json<DeletedResponse>> {
    state
        .db
        .get_template(&template_id)
        .await?
        .filter(|t| t.owner == user.email)
        .ok_or_else(|| AppError::NotFound(format!("Template {}", template_id)))?;

    state.db.delete_template(&template_id).await?;

    Ok(Json(DeletedResponse { deleted: true }))
}

// ─── Tracking Pixel ──────────────────────────────────────────

/// Tracking pixel: always returns the fixed 1x1 GIF.
///
/// Open recording is best-effort; no failure (unknown contact, database
/// offline) ever changes the response, and the first open wins.
async fn tracking_pixel(
    State(state): State<Arc<AppState>>,
    Path((campaign_id, contact_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.db.get_contact(&contact_id).await {
        Ok(Some(mut contact)) if contact.campaign_id == campaign_id => {
            if contact.opened_at.is_none() {
                contact.opened_at = Some(Utc::now().to_rfc3339());
                if let Err(e) = state.db.upsert_contact(&contact).await {
                    tracing::warn!(error = %e, contact_id = %contact_id, "Failed to record open");
                } else {
                    tracing::debug!(
                        campaign_id = %campaign_id,
                        contact_id = %contact_id,
                        "Recorded first open"
                    );
                }
            }
        }
        Ok(_) => {
            tracing::debug!(
                campaign_id = %campaign_id,
                contact_id = %contact_id,
                "Pixel hit for unknown contact"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "Pixel open lookup failed");
        }
    }

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        PIXEL_GIF,
    )
}
