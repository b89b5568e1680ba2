// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth flow tests: redirect construction and state handling.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn test_auth_start_redirects_to_google() {
    let (app, state) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/google")
                .header(header::HOST, "localhost:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("redirect must carry a Location header");

    assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth"));
    assert!(location.contains(&format!("client_id={}", state.config.google_client_id)));
    assert!(location.contains("access_type=offline"));
    assert!(location.contains("state="));
    // Callback must point back at the requesting host
    assert!(location.contains(urlencoding::encode("http://localhost:8080/auth/google/callback").as_ref()));
}

#[tokio::test]
async fn test_callback_with_provider_error_redirects_to_frontend() {
    let (app, state) = common::create_test_app();

    // A tampered state falls back to the configured frontend URL; the
    // provider error must be propagated without any token exchange.
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/google/callback?state=tampered&error=access_denied")
                .header(header::HOST, "localhost:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap();

    assert!(location.starts_with(&state.config.frontend_url));
    assert!(location.contains("error=access_denied"));
}

#[tokio::test]
async fn test_callback_without_code_redirects_with_error() {
    let (app, state) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/google/callback?state=whatever")
                .header(header::HOST, "localhost:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap();

    assert!(location.starts_with(&state.config.frontend_url));
    assert!(location.contains("error=missing_code"));
}

#[tokio::test]
async fn test_logout_redirects() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}
