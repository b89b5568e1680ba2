// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use mailient::config::Config;
use mailient::db::FirestoreDb;
use mailient::routes::create_router;
use mailient::services::visitor::{TtlCache, VisitorIdCache, AVATAR_TTL_SECS};
use mailient::services::{
    AiService, CalendarService, GmailService, GoogleOidcVerifier, KmsService, TasksService,
    TtsService,
};
use mailient::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a test app over the given database.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app_with_db(db: FirestoreDb) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let tasks_service = TasksService::new(&config.gcp_project_id, &config.gcp_region);
    let google_oidc_verifier =
        Arc::new(GoogleOidcVerifier::new(&config).expect("Failed to build OIDC verifier"));

    let kms = KmsService::new_mock();
    let token_cache = Arc::new(dashmap::DashMap::new());
    let refresh_locks = Arc::new(dashmap::DashMap::new());

    let gmail_service = GmailService::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        db.clone(),
        kms,
        token_cache,
        refresh_locks,
    );

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

    let state = Arc::new(AppState {
        config,
        db,
        gmail_service,
        calendar_service: CalendarService::new(),
        ai_service,
        tts_service,
        tasks_service,
        google_oidc_verifier,
        visitor_ids: VisitorIdCache::new(),
        avatar_cache: TtlCache::new(AVATAR_TTL_SECS),
    });

    (create_router(state.clone()), state)
}

/// Create a test app with offline mock dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_db(test_db_offline())
}

/// Create a session JWT signed with the test config's key.
#[allow(dead_code)]
pub fn create_test_jwt(email: &str, signing_key: &[u8]) -> String {
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde::Serialize;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: usize,
        iat: usize,
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    let claims = Claims {
        sub: email.to_string(),
        exp: now + 86400,
        iat: now,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .unwrap()
}
