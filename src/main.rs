// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Mailient API Server
//!
//! Gmail-backed email/productivity assistant: OAuth token lifecycle,
//! cached mailbox reads, AI replies/notes, calendar recommendations,
//! missions, outreach campaigns, billing webhooks, and TTS narration.

use mailient::{
    config::Config,
    db::FirestoreDb,
    services::visitor::{TtlCache, VisitorIdCache, AVATAR_TTL_SECS},
    services::{
        AiService, CalendarService, GmailService, GoogleOidcVerifier, KmsService, TasksService,
        TtsService,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Mailient API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Initialize Cloud Tasks service
    let tasks_service = TasksService::new(&config.gcp_project_id, &config.gcp_region);
    tracing::info!(
        project = %config.gcp_project_id,
        "Cloud Tasks service initialized"
    );

    let google_oidc_verifier =
        Arc::new(GoogleOidcVerifier::new(&config).expect("Failed to initialize OIDC verifier"));

    // Initialize KMS service
    let kms = KmsService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        "token-encryption",
    )
    .await
    .expect("Failed to initialize KMS service");
    tracing::info!("KMS service initialized");

    // Initialize shared token cache and refresh locks
    // These are shared across all GmailService instances within this server instance
    let token_cache = Arc::new(dashmap::DashMap::new());
    let refresh_locks = Arc::new(dashmap::DashMap::new());
    tracing::info!("Token cache initialized");

    // Initialize Gmail service (token lifecycle + API access)
    let gmail_service = GmailService::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        db.clone(),
        kms,
        token_cache,
        refresh_locks,
    );

    // Upstream provider clients
    let calendar_service = CalendarService::new();
    let ai_service = AiService::new(
        config.ai_api_base.clone(),
        config.ai_api_key.clone(),
        config.ai_model.clone(),
    );
    let tts_service = TtsService::new(
        config.tts_api_base.clone(),
        config.tts_api_key.clone(),
        config.tts_voice_id.clone(),
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        gmail_service,
        calendar_service,
        ai_service,
        tts_service,
        tasks_service,
        google_oidc_verifier,
        visitor_ids: VisitorIdCache::new(),
        avatar_cache: TtlCache::new(AVATAR_TTL_SECS),
    });

    // Build router
    let app = mailient::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mailient=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
