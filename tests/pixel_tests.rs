// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tracking pixel tests: the response is a fixed 1x1 GIF, regardless of
//! auth, contact validity, or database availability.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

mod common;

const EXPECTED_GIF_LEN: usize = 43;

async fn fetch_pixel(path: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();

    (status, headers, body)
}

#[tokio::test]
async fn test_pixel_returns_fixed_gif_without_auth() {
    let (status, headers, body) = fetch_pixel("/t/c1/ct1/open.gif").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/gif");
    assert_eq!(
        headers.get(header::CACHE_CONTROL).unwrap(),
        "no-store, no-cache, must-revalidate"
    );

    assert_eq!(body.len(), EXPECTED_GIF_LEN);
    assert_eq!(&body[..6], b"GIF89a");
    assert_eq!(*body.last().unwrap(), 0x3B);
}

#[tokio::test]
async fn test_pixel_identical_for_unknown_contact_and_db_failure() {
    // The offline mock DB makes the open-recording lookup fail; the
    // response must be byte-identical anyway.
    let (status_a, _, body_a) = fetch_pixel("/t/c1/ct1/open.gif").await;
    let (status_b, _, body_b) = fetch_pixel("/t/other/unknown/open.gif").await;

    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::OK);
    assert_eq!(body_a, body_b);
}
