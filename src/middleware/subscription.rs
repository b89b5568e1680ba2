// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription gate for premium routes (AI, TTS).

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Require an active subscription for premium routes.
///
/// Runs after `require_auth`, so the `AuthUser` extension is present.
pub async fn require_subscription(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(user) = request.extensions().get::<AuthUser>().cloned() else {
        return AppError::Unauthorized.into_response();
    };

    match state.db.get_subscription(&user.email).await {
        Ok(Some(subscription)) if subscription.is_active() => next.run(request).await,
        Ok(_) => {
            tracing::debug!(email = %user.email, "Premium route blocked: no active subscription");
            AppError::SubscriptionRequired.into_response()
        }
        Err(e) => e.into_response(),
    }
}
