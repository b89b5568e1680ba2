// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Billing routes: webhook receiver from the payment provider and
//! subscription status for the session user.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{Subscription, SubscriptionStatus};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook signature timestamp (replay window).
const SIGNATURE_MAX_AGE_SECS: i64 = 5 * 60;

/// Public webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/billing/{uuid}", post(handle_event))
}

/// Session-gated subscription status route.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/subscription", get(get_subscription))
}

/// Billing webhook event payload.
#[derive(Deserialize, Debug)]
struct BillingEvent {
    /// "subscription.updated" or "subscription.deleted"
    #[serde(rename = "type")]
    event_type: String,
    data: BillingEventData,
}

#[derive(Deserialize, Debug)]
struct BillingEventData {
    /// Customer email the subscription belongs to
    customer_email: String,
    #[serde(default)]
    plan: Option<String>,
    #[serde(default)]
    status: Option<String>,
    /// End of the current billing period (ISO 8601)
    #[serde(default)]
    current_period_end: Option<String>,
}

/// Verify the `Billing-Signature: t=<unix>,v1=<hex>` header over the raw body.
///
/// The signed payload is `"{t}.{body}"`. Stale timestamps are rejected to
/// bound replay.
fn verify_signature(
    headers: &HeaderMap,
    body: &[u8],
    secret: &str,
    now_unix: i64,
) -> bool {
    let Some(header) = headers
        .get("Billing-Signature")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    let mut timestamp: Option<i64> = None;
    let mut signature_hex: Option<&str> = None;

    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t.parse().ok();
        } else if let Some(v1) = part.strip_prefix("v1=") {
            signature_hex = Some(v1);
        }
    }

    let (Some(timestamp), Some(signature_hex)) = (timestamp, signature_hex) else {
        return false;
    };

    if (now_unix - timestamp).abs() > SIGNATURE_MAX_AGE_SECS {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    let expected = hex::encode(mac.finalize().into_bytes());
    // Hex compare of fixed-length digests
    expected == signature_hex.to_ascii_lowercase()
}

/// Handle incoming billing webhook events (POST).
///
/// Returns 200 for anything past authentication so the provider does not
/// retry events we have already judged malformed.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // Validate Path UUID
    if uuid != state.config.billing_webhook_path_uuid {
        tracing::warn!(
            received_uuid = %uuid,
            "Security Alert: Billing webhook path UUID mismatch"
        );
        return StatusCode::NOT_FOUND;
    }

    // Validate signature over the raw body
    let now_unix = chrono::Utc::now().timestamp();
    if !verify_signature(
        &headers,
        &body,
        &state.config.billing_webhook_secret,
        now_unix,
    ) {
        tracing::warn!("Security Alert: Billing webhook signature verification failed");
        return StatusCode::FORBIDDEN;
    }

    let event: BillingEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse billing event");
            return StatusCode::OK; // Acknowledge to avoid provider retries
        }
    };

    tracing::info!(
        event_type = %event.event_type,
        customer = %event.data.customer_email,
        "Billing event received"
    );

    let email = event.data.customer_email.clone();
    let now = chrono::Utc::now().to_rfc3339();

    let subscription = match event.event_type.as_str() {
        "subscription.updated" => Subscription {
            email,
            plan: event.data.plan.unwrap_or_else(|| "pro".to_string()),
            status: match event.data.status.as_deref() {
                Some("past_due") => SubscriptionStatus::PastDue,
                Some("canceled") => SubscriptionStatus::Canceled,
                _ => SubscriptionStatus::Active,
            },
            current_period_end: event.data.current_period_end,
            updated_at: now,
        },
        "subscription.deleted" => Subscription {
            email,
            plan: event.data.plan.unwrap_or_else(|| "free".to_string()),
            status: SubscriptionStatus::Canceled,
            current_period_end: event.data.current_period_end,
            updated_at: now,
        },
        other => {
            tracing::debug!(event_type = %other, "Ignoring unhandled billing event type");
            return StatusCode::OK;
        }
    };

    if let Err(e) = state.db.set_subscription(&subscription).await {
        tracing::error!(error = %e, "Failed to store subscription state");
        // Signal failure so the provider retries delivery
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    StatusCode::OK
}

// ─── Subscription Status ─────────────────────────────────────

#[derive(Serialize)]
pub struct SubscriptionResponse {
    pub plan: String,
    pub status: SubscriptionStatus,
    pub active: bool,
    pub current_period_end: Option<String>,
}

/// Get subscription state for the session user.
async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SubscriptionResponse>> {
    let subscription = state.db.get_subscription(&user.email).await?;

    let response = match subscription {
        Some(s) => SubscriptionResponse {
            plan: s.plan.clone(),
            status: s.status,
            active: s.is_active(),
            current_period_end: s.current_period_end,
        },
        None => SubscriptionResponse {
            plan: "free".to_string(),
            status: SubscriptionStatus::Canceled,
            active: false,
            current_period_end: None,
        },
    };

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn headers_with(signature: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Billing-Signature", signature.parse().unwrap());
        headers
    }

    #[test]
    fn valid_signature_accepted() {
        let secret = "whsec_test";
        let body = br#"{"type":"subscription.updated"}"#;
        let now = 1_700_000_000;

        let sig = sign(secret, now, body);
        let headers = headers_with(&format!("t={},v1={}", now, sig));

        assert!(verify_signature(&headers, body, secret, now));
    }

    #[test]
    fn tampered_body_rejected() {
        let secret = "whsec_test";
        let now = 1_700_000_000;

        let sig = sign(secret, now, br#"{"type":"subscription.updated"}"#);
        let headers = headers_with(&format!("t={},v1={}", now, sig));

        assert!(!verify_signature(
            &headers,
            br#"{"type":"subscription.deleted"}"#,
            secret,
            now
        ));
    }

    #[test]
    fn wrong_secret_rejected() {
        let body = br#"{"type":"subscription.updated"}"#;
        let now = 1_700_000_000;

        let sig = sign("whsec_other", now, body);
        let headers = headers_with(&format!("t={},v1={}", now, sig));

        assert!(!verify_signature(&headers, body, "whsec_test", now));
    }

    #[test]
    fn stale_timestamp_rejected() {
        let secret = "whsec_test";
        let body = br#"{}"#;
        let signed_at = 1_700_000_000;
        let now = signed_at + SIGNATURE_MAX_AGE_SECS + 1;

        let sig = sign(secret, signed_at, body);
        let headers = headers_with(&format!("t={},v1={}", signed_at, sig));

        assert!(!verify_signature(&headers, body, secret, now));
    }

    #[test]
    fn missing_or_malformed_header_rejected() {
        let secret = "whsec_test";
        let body = br#"{}"#;
        let now = 1_700_000_000;

        assert!(!verify_signature(&HeaderMap::new(), body, secret, now));

        let headers = headers_with("v1=deadbeef");
        assert!(!verify_signature(&headers, body, secret, now));

        let headers = headers_with("t=notanumber,v1=deadbeef");
        assert!(!verify_signature(&headers, body, secret, now));
    }
}
