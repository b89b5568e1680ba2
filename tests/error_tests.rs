// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error-to-HTTP mapping tests.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use mailient::error::AppError;

fn status_of(err: AppError) -> StatusCode {
    err.into_response().status()
}

#[test]
fn test_error_status_codes() {
    assert_eq!(status_of(AppError::Unauthorized), StatusCode::UNAUTHORIZED);
    assert_eq!(status_of(AppError::InvalidToken), StatusCode::UNAUTHORIZED);
    assert_eq!(
        status_of(AppError::ReauthRequired),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        status_of(AppError::Forbidden("nope".to_string())),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        status_of(AppError::SubscriptionRequired),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        status_of(AppError::NotFound("thing".to_string())),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        status_of(AppError::BadRequest("bad".to_string())),
        StatusCode::BAD_REQUEST
    );
    // Upstream provider failures are generic 500s
    assert_eq!(
        status_of(AppError::GmailApi("boom".to_string())),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        status_of(AppError::AiApi("boom".to_string())),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        status_of(AppError::TtsApi("boom".to_string())),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        status_of(AppError::Database("boom".to_string())),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        status_of(AppError::Internal(anyhow::anyhow!("boom"))),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn test_gmail_token_error_detection() {
    assert!(AppError::ReauthRequired.is_gmail_token_error());
    assert!(
        AppError::GmailApi(AppError::GMAIL_TOKEN_ERROR.to_string()).is_gmail_token_error()
    );
    assert!(AppError::GmailApi("invalid_grant".to_string()).is_gmail_token_error());
    assert!(!AppError::GmailApi("HTTP 503: flaky".to_string()).is_gmail_token_error());
    assert!(!AppError::Unauthorized.is_gmail_token_error());
}
