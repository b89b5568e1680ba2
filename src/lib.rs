// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Mailient: Gmail-backed email/productivity assistant API.
//!
//! This crate provides the backend API: Google OAuth sign-in, encrypted
//! token lifecycle, cached mailbox reads, AI-assisted replies and notes,
//! calendar recommendations, mission tracking, outreach campaigns,
//! billing webhooks, and TTS narration.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::{AiService, CalendarService, GmailService, GoogleOidcVerifier, TasksService, TtsService};
use services::visitor::{TtlCache, VisitorIdCache};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub gmail_service: GmailService,
    pub calendar_service: CalendarService,
    pub ai_service: AiService,
    pub tts_service: TtsService,
    pub tasks_service: TasksService,
    pub google_oidc_verifier: Arc<GoogleOidcVerifier>,
    /// Per-user visitor ids (analytics), regenerated after TTL expiry
    pub visitor_ids: VisitorIdCache,
    /// Google profile picture URLs, re-fetched after TTL expiry
    pub avatar_cache: TtlCache,
}
