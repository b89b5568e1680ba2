// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Security tests for the `/tasks/*` Cloud Tasks callback routes.
//!
//! These endpoints must only be reachable with the Cloud Tasks queue
//! header and a valid OIDC token; external requests are rejected before
//! any handler runs.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use tower::ServiceExt;

mod common;

const TASK_ROUTES: &[&str] = &[
    "/tasks/sync-mailbox",
    "/tasks/scan-follow-ups",
    "/tasks/process-follow-up",
    "/tasks/delete-user",
];

#[tokio::test]
async fn test_tasks_routes_reject_requests_without_queue_header() {
    for route in TASK_ROUTES {
        let (app, _) = common::create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(*route)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.status(),
            StatusCode::FORBIDDEN,
            "{} must reject requests without the queue header",
            route
        );
    }
}

#[tokio::test]
async fn test_tasks_routes_reject_wrong_queue_name() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tasks/sync-mailbox")
                .header("x-cloudtasks-queuename", "some-other-queue")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_tasks_routes_reject_missing_oidc_token() {
    let (app, _) = common::create_test_app();

    // Correct queue header but no Authorization: blocked by OIDC check
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tasks/sync-mailbox")
                .header("x-cloudtasks-queuename", "mailient-outreach")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_tasks_routes_reject_garbage_bearer_token() {
    let (app, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tasks/delete-user")
                .header("x-cloudtasks-queuename", "mailient-outreach")
                .header(header::AUTHORIZATION, "Bearer not.a.jwt")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
