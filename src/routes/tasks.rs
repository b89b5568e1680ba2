// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Task handler routes for Cloud Tasks callbacks.
//!
//! These endpoints are called by Cloud Tasks (and Cloud Scheduler), not
//! directly by users. They are gated by the tasks-auth middleware, which
//! verifies the queue header and the Cloud Tasks OIDC token.

use crate::error::AppError;
use crate::models::CampaignStatus;
use crate::services::tasks::{DeleteUserPayload, ProcessFollowUpPayload, SyncMailboxPayload};
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use chrono::Utc;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;

/// How many messages one sync pass fetches from Gmail.
const SYNC_PAGE_SIZE: u32 = 100;

/// Concurrent full-message fetches per sync pass.
const MAX_CONCURRENT_FETCHES: usize = 10;

/// Task handler routes (called by Cloud Tasks).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/sync-mailbox", post(sync_mailbox))
        .route("/tasks/scan-follow-ups", post(scan_follow_ups))
        .route("/tasks/process-follow-up", post(process_follow_up))
        .route("/tasks/delete-user", post(delete_user))
}

// ─── Mailbox Sync ────────────────────────────────────────────

/// Sync a user's recent messages into the cache (called by Cloud Tasks).
async fn sync_mailbox(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SyncMailboxPayload>,
) -> StatusCode {
    tracing::info!(
        email = %payload.email,
        source = %payload.source,
        "Syncing mailbox from Cloud Task"
    );

    let page = match state
        .gmail_service
        .list_messages(&payload.email, Some("newer_than:7d"), None, SYNC_PAGE_SIZE)
        .await
    {
        Ok(page) => page,
        Err(AppError::ReauthRequired) => {
            // Permanent until the user reconnects; retrying won't help.
            tracing::warn!(email = %payload.email, "Sync skipped: re-authentication required");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list messages for sync");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    let synced_at = Utc::now().to_rfc3339();
    let owner = payload.email.clone();

    let results: Vec<Result<crate::models::CachedEmail, AppError>> = stream::iter(page.messages)
        .map(|m| {
            let gmail = state.gmail_service.clone();
            let db = state.db.clone();
            let owner = owner.clone();
            let synced_at = synced_at.clone();
            async move {
                let message = gmail.get_message(&owner, &m.id).await?;
                let cached = message.to_cached_email(&owner, &synced_at);
                db.upsert_email(&cached).await?;
                Ok(cached)
            }
        })
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .collect()
        .await;

    let mut synced = 0usize;
    let mut failed = 0usize;
    let mut inbound_senders: std::collections::HashSet<String> = std::collections::HashSet::new();

    for result in results {
        match result {
            Ok(cached) => {
                synced += 1;
                if !cached.is_sent {
                    inbound_senders.insert(
                        crate::models::CachedEmail::header_address(&cached.from).to_lowercase(),
                    );
                }
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(error = %e, "Failed to sync message");
            }
        }
    }

    // A reply from a campaign contact retires them from follow-ups.
    if !inbound_senders.is_empty() {
        if let Err(e) = mark_replied_contacts(&state, &payload.email, &inbound_senders).await {
            tracing::warn!(error = %e, "Failed to update replied contacts");
        }
    }

    tracing::info!(
        email = %payload.email,
        synced,
        failed,
        "Mailbox sync complete"
    );

    if synced == 0 && failed > 0 {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

/// Mark campaign contacts as replied when their address shows up inbound.
async fn mark_replied_contacts(
    state: &AppState,
    owner: &str,
    inbound_senders: &std::collections::HashSet<String>,
) -> Result<(), AppError> {
    let campaigns = state.db.get_campaigns_for_user(owner).await?;

    for campaign in campaigns {
        let contacts = state.db.get_contacts_for_campaign(&campaign.id).await?;
        for mut contact in contacts {
            if !contact.replied && inbound_senders.contains(&contact.email_address.to_lowercase())
            {
                contact.replied = true;
                state.db.upsert_contact(&contact).await?;
                tracing::info!(
                    contact_id = %contact.id,
                    campaign_id = %campaign.id,
                    "Contact replied, retiring from follow-ups"
                );
            }
        }
    }

    Ok(())
}

// ─── Follow-up Scan ──────────────────────────────────────────

#[derive(Serialize)]
struct ScanResponse {
    due: usize,
    queued: u32,
    failed: u32,
}

/// Find due follow-ups across all active campaigns and fan them out as
/// one Cloud Task per contact (hit on schedule by Cloud Scheduler).
async fn scan_follow_ups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScanResponse>, AppError> {
    let now = Utc::now();
    let campaigns = state.db.get_active_campaigns().await?;

    let mut due = Vec::new();
    for campaign in &campaigns {
        let contacts = state.db.get_contacts_for_campaign(&campaign.id).await?;
        for contact in contacts {
            if contact.is_due(campaign, now) {
                due.push(ProcessFollowUpPayload {
                    contact_id: contact.id,
                    campaign_id: campaign.id.clone(),
                    owner: campaign.owner.clone(),
                });
            }
        }
    }

    let due_count = due.len();
    let result = state
        .tasks_service
        .queue_follow_ups(&state.config.api_url, due)
        .await;

    if result.is_partial_failure() {
        tracing::warn!(
            queued = result.queued,
            failed = result.failed,
            "Follow-up fan-out partially failed"
        );
    }

    tracing::info!(
        campaigns = campaigns.len(),
        due = due_count,
        queued = result.queued,
        "Follow-up scan complete"
    );

    Ok(Json(ScanResponse {
        due: due_count,
        queued: result.queued,
        failed: result.failed,
    }))
}

// ─── Follow-up Processing ────────────────────────────────────

/// Send one due follow-up (called by Cloud Tasks).
async fn process_follow_up(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProcessFollowUpPayload>,
) -> StatusCode {
    tracing::info!(
        contact_id = %payload.contact_id,
        campaign_id = %payload.campaign_id,
        "Processing follow-up from Cloud Task"
    );

    let loaded = async {
        let campaign = state
            .db
            .get_campaign(&payload.campaign_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Campaign {}", payload.campaign_id)))?;
        let contact = state
            .db
            .get_contact(&payload.contact_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Contact {}", payload.contact_id)))?;
        let template = state
            .db
            .get_template(&campaign.template_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Template {}", campaign.template_id)))?;
        Ok::<_, AppError>((campaign, contact, template))
    }
    .await;

    let (campaign, mut contact, template) = match loaded {
        Ok(t) => t,
        Err(AppError::NotFound(what)) => {
            // Deleted since the scan; nothing to retry.
            tracing::warn!(missing = %what, "Follow-up skipped: record gone");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load follow-up records");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    // Re-check due-ness: the contact may have replied (or the campaign
    // been paused) between scan and processing.
    let now = Utc::now();
    if campaign.status != CampaignStatus::Active || !contact.is_due(&campaign, now) {
        tracing::info!(
            contact_id = %contact.id,
            "Follow-up no longer due (replied, paused, or already sent)"
        );
        return StatusCode::OK;
    }

    let (subject, body) = template.render(&contact);
    let subject = format!("Re: {}", subject);
    let raw = crate::services::gmail::build_rfc2822(
        &campaign.owner,
        &contact.email_address,
        &subject,
        &body,
        None,
    );

    match state.gmail_service.send_message(&campaign.owner, &raw).await {
        Ok(sent) => {
            contact.stage += 1;
            contact.last_contacted_at = Some(now.to_rfc3339());
            if let Err(e) = state.db.upsert_contact(&contact).await {
                tracing::error!(error = %e, "Follow-up sent but contact update failed");
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
            tracing::info!(
                contact_id = %contact.id,
                message_id = %sent.id,
                stage = contact.stage,
                "Follow-up sent"
            );
            StatusCode::OK
        }
        Err(AppError::ReauthRequired) => {
            // Retrying cannot help until the owner reconnects.
            tracing::warn!(
                owner = %campaign.owner,
                "Follow-up skipped: owner must re-authenticate"
            );
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(error = %e, "Follow-up send failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ─── User Deletion ───────────────────────────────────────────

/// Delete all data for a user (called by Cloud Tasks).
async fn delete_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeleteUserPayload>,
) -> StatusCode {
    tracing::info!(
        email = %payload.email,
        source = %payload.source,
        "Deleting user from Cloud Task"
    );

    // 1. Tokens first: revoke the Google grant and drop the record, so
    //    concurrent tasks can no longer act on the user's behalf.
    if let Err(e) = state
        .gmail_service
        .revoke_and_delete_tokens(&payload.email)
        .await
    {
        tracing::error!(error = %e, "Failed to revoke tokens");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    // 2. In-process caches
    state.visitor_ids.remove(&payload.email);
    state.avatar_cache.remove(&payload.email);

    // 3. Everything else
    match state.db.delete_user_data(&payload.email).await {
        Ok(deleted) => {
            tracing::info!(email = %payload.email, deleted, "User deletion complete");
            StatusCode::OK
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete user data");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
