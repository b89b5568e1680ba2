// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token lifecycle tests against the Firestore emulator.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use mailient::models::UserTokens;

mod common;

/// Seed a token record the way the mock KMS writes it: AAD-bound
/// ciphertexts with the user's email.
async fn seed_tokens(
    state: &mailient::AppState,
    email: &str,
    access: &str,
    refresh: &str,
    expires_at: chrono::DateTime<Utc>,
) {
    let aad = mailient::services::kms::token_aad(email);
    let tokens = UserTokens {
        access_token_encrypted: format!("AAD:{}:{}", hex::encode(&aad), BASE64.encode(access)),
        refresh_token_encrypted: format!("AAD:{}:{}", hex::encode(&aad), BASE64.encode(refresh)),
        expires_at: expires_at.to_rfc3339(),
        scopes: vec!["https://www.googleapis.com/auth/gmail.modify".to_string()],
    };
    state.db.set_tokens(email, &tokens).await.unwrap();
}

#[tokio::test]
async fn test_valid_token_served_from_store() {
    require_emulator!();

    let db = common::test_db().await;
    let (_, state) = common::create_test_app_with_db(db);
    let email = "ada@example.com";

    seed_tokens(
        &state,
        email,
        "valid_access_token",
        "valid_refresh_token",
        Utc::now() + chrono::Duration::hours(1),
    )
    .await;

    let token = state
        .gmail_service
        .get_valid_access_token(email)
        .await
        .expect("valid token should be returned");
    assert_eq!(token, "valid_access_token");

    // Second call hits the in-memory cache and must agree
    let again = state
        .gmail_service
        .get_valid_access_token(email)
        .await
        .unwrap();
    assert_eq!(again, "valid_access_token");
}

#[tokio::test]
async fn test_missing_tokens_reported_distinctly() {
    require_emulator!();

    let db = common::test_db().await;
    let (_, state) = common::create_test_app_with_db(db);

    // Never-connected user: absence, not expiry
    let err = state
        .gmail_service
        .get_valid_access_token("nobody@example.com")
        .await
        .expect_err("missing tokens must error");
    assert!(matches!(err, mailient::error::AppError::ReauthRequired));

    let status = state
        .gmail_service
        .token_status("nobody@example.com")
        .await
        .unwrap();
    assert!(!status.connected);
    assert!(status.expires_at.is_none());
}

#[tokio::test]
async fn test_token_status_distinguishes_expiry_from_absence() {
    require_emulator!();

    let db = common::test_db().await;
    let (_, state) = common::create_test_app_with_db(db);
    let email = "expired@example.com";

    seed_tokens(
        &state,
        email,
        "stale_access_token",
        "dead_refresh_token",
        Utc::now() - chrono::Duration::hours(2),
    )
    .await;

    let status = state.gmail_service.token_status(email).await.unwrap();
    assert!(status.connected, "expired is still connected");
    assert!(status.expired);
    assert!(status.expires_at.is_some());
}

#[tokio::test]
async fn test_failed_refresh_never_returns_stale_token() {
    require_emulator!();

    let db = common::test_db().await;
    let (_, state) = common::create_test_app_with_db(db);
    let email = "expired@example.com";

    seed_tokens(
        &state,
        email,
        "stale_access_token",
        "dead_refresh_token",
        Utc::now() - chrono::Duration::hours(2),
    )
    .await;

    // The refresh token is garbage, so the refresh attempt fails (either
    // the token endpoint rejects it with invalid_grant, or the request
    // itself fails in an offline test environment). Whatever the failure,
    // the stale access token must never come back.
    let result = state.gmail_service.get_valid_access_token(email).await;
    match result {
        Ok(token) => panic!("expected an error, got a token: {}", token),
        Err(e) => {
            // The error must not smuggle the stale token out
            assert!(!format!("{e}").contains("stale_access_token"));
        }
    }
}
