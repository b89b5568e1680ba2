// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid tokens
//! 2. Protected routes accept requests with valid tokens
//! 3. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn test_protected_route_without_token() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/missions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Should return 401 Unauthorized without token
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/missions")
                .header(header::AUTHORIZATION, "Bearer invalid.token.here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Should return 401 Unauthorized with invalid token
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_valid_token() {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt("ada@example.com", &state.config.jwt_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/missions")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // With valid token: 200 if Firestore available, 500 if offline mock.
    // The key check is that we DON'T get 401 (authentication succeeded).
    let status = response.status();
    assert!(
        status == StatusCode::OK || status == StatusCode::INTERNAL_SERVER_ERROR,
        "Expected 200 or 500, got {}. Auth should pass, Firestore may fail without emulator.",
        status
    );
}

#[tokio::test]
async fn test_unauthenticated_requests_cover_all_protected_surfaces() {
    // Every session-gated surface must 401 without a token - and cause no
    // side effect (the offline DB would 500 if a handler ran).
    let routes = [
        ("GET", "/api/me"),
        ("PUT", "/api/profile"),
        ("DELETE", "/api/account"),
        ("GET", "/api/mail/messages"),
        ("POST", "/api/mail/send"),
        ("GET", "/api/missions"),
        ("POST", "/api/missions"),
        ("POST", "/api/missions/detect"),
        ("GET", "/api/campaigns"),
        ("POST", "/api/templates"),
        ("POST", "/api/calendar/recommendations"),
        ("POST", "/api/tokens"),
        ("GET", "/api/tokens/status"),
        ("GET", "/api/subscription"),
        ("POST", "/api/ai/reply"),
        ("POST", "/api/ai/note"),
        ("GET", "/api/ai/reply/stream"),
        ("POST", "/api/tts"),
    ];

    for (method, uri) in routes {
        let (app, _) = common::create_test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "{} {} should 401 without a session",
            method,
            uri
        );
    }
}

#[tokio::test]
async fn test_premium_route_without_subscription() {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt("ada@example.com", &state.config.jwt_signing_key);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ai/reply")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"message_id":"m1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    // Authenticated but unsubscribed: the gate returns 403 when the lookup
    // finds no subscription, or 500 when the offline mock DB errors out.
    // Either way the handler itself must not run (it would need Gmail).
    let status = response.status();
    assert!(
        status == StatusCode::FORBIDDEN || status == StatusCode::INTERNAL_SERVER_ERROR,
        "Expected 403 or 500, got {}",
        status
    );
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/missions")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // OPTIONS should return 200 (CORS preflight success)
    assert_eq!(response.status(), StatusCode::OK);

    // Should have CORS headers
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}

#[tokio::test]
async fn test_public_route_no_auth_required() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Health should be accessible without auth
    assert_eq!(response.status(), StatusCode::OK);
}
