// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth authentication routes and token storage endpoints.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Extension, Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, AuthUser};
use crate::services::gmail::OAUTH_SCOPES;
use crate::services::tasks::SyncMailboxPayload;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// Public OAuth routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google", get(auth_start))
        .route("/auth/google/callback", get(auth_callback))
        .route("/auth/logout", get(logout))
}

/// Session-gated token storage endpoints (mounted under the protected group).
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tokens", post(store_tokens))
        .route("/api/tokens/status", get(token_status))
}

/// Query parameters for starting OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Frontend URL to redirect back to after OAuth completes.
    /// If not provided, uses FRONTEND_URL env var.
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Start OAuth flow - redirect to Google authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
    headers: axum::http::HeaderMap,
) -> Result<Redirect> {
    // Get the frontend URL from query param or fall back to config
    let frontend_url = params
        .redirect_uri
        .unwrap_or_else(|| state.config.frontend_url.clone());

    // Encode frontend URL + timestamp in state
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis();

    // Create the data payload: "frontend_url|timestamp_hex"
    let state_payload = format!("{}|{:x}", frontend_url, timestamp);

    // Sign the payload
    let mut mac = HmacSha256::new_from_slice(&state.config.oauth_state_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(state_payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    // Combine payload + signature: "payload|signature_hex", base64 for the URL
    let signed_state = format!("{}|{}", state_payload, hex::encode(signature));
    let oauth_state = URL_SAFE_NO_PAD.encode(signed_state.as_bytes());

    let callback_url = callback_url_from_headers(&headers);

    let auth_url = format!(
        "https://accounts.google.com/o/oauth2/v2/auth?\
         client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         scope={}&\
         access_type=offline&\
         prompt=consent&\
         state={}",
        state.config.google_client_id,
        urlencoding::encode(&callback_url),
        urlencoding::encode(&OAUTH_SCOPES.join(" ")),
        oauth_state
    );

    tracing::info!(
        client_id = %state.config.google_client_id,
        frontend_url = %frontend_url,
        "Starting OAuth flow, redirecting to Google"
    );

    Ok(Redirect::temporary(&auth_url))
}

/// Reconstruct this instance's OAuth callback URL from the request host.
fn callback_url_from_headers(headers: &axum::http::HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            std::env::var("API_HOST").unwrap_or_else(|_| "localhost:8080".to_string())
        });

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };

    format!("{}://{}/auth/google/callback", scheme, host)
}

#[derive(Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens, create session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    // Decode and verify frontend URL from state parameter
    let frontend_url = verify_and_decode_state(&params.state, &state.config.oauth_state_key)
        .unwrap_or_else(|| {
            tracing::warn!(
                "Invalid or tampered state parameter, falling back to default frontend URL"
            );
            state.config.frontend_url.clone()
        });

    // Check for OAuth errors
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Google");
        let redirect = format!("{}?error={}", frontend_url, urlencoding::encode(&error));
        return Ok(Redirect::temporary(&redirect));
    }

    let Some(code) = params.code else {
        let redirect = format!("{}?error=missing_code", frontend_url);
        return Ok(Redirect::temporary(&redirect));
    };

    tracing::info!("Exchanging authorization code for tokens");

    let callback_url = callback_url_from_headers(&headers);

    // Exchange code, resolve user, store user/profile/tokens
    let oauth_result = state
        .gmail_service
        .handle_oauth_callback(&code, &callback_url)
        .await?;

    tracing::info!(
        email = %oauth_result.email,
        "OAuth successful, user and tokens stored"
    );

    // Queue the initial mailbox sync; sign-in must not fail if this does
    let sync_payload = SyncMailboxPayload {
        email: oauth_result.email.clone(),
        source: "signin".to_string(),
    };
    if let Err(e) = state
        .tasks_service
        .queue_sync_mailbox(&state.config.api_url, sync_payload)
        .await
    {
        tracing::warn!(error = %e, "Failed to queue mailbox sync, continuing anyway");
    }

    // Create JWT session token
    let jwt = create_jwt(&oauth_result.email, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    // Redirect to frontend with token
    let redirect_url = format!("{}/callback?token={}", frontend_url, jwt);

    Ok(Redirect::temporary(&redirect_url))
}

/// Verify HMAC signature and decode the frontend URL from the OAuth state parameter.
fn verify_and_decode_state(state: &str, secret: &[u8]) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Format is "frontend_url|timestamp_hex|signature_hex"
    let parts: Vec<&str> = state_str.splitn(3, '|').collect();
    if parts.len() != 3 {
        return None;
    }

    let frontend_url = parts[0];
    let timestamp_hex = parts[1];
    let signature_hex = parts[2];

    // Reconstruct payload and verify signature
    let payload = format!("{}|{}", frontend_url, timestamp_hex);

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());

    let expected_signature = hex::encode(mac.finalize().into_bytes());

    if signature_hex != expected_signature {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    Some(frontend_url.to_string())
}

/// Logout - just a placeholder that clears client-side token.
async fn logout() -> Redirect {
    // The actual logout happens on client side by clearing the cookie
    Redirect::temporary("/")
}

// ─── Token Storage Endpoints ─────────────────────────────────────

/// Request body for storing a token set handed over by the identity
/// provider at sign-in.
#[derive(Deserialize, Validate)]
pub struct StoreTokensRequest {
    #[validate(length(min = 1, message = "access_token must not be empty"))]
    pub access_token: String,
    #[validate(length(min = 1, message = "refresh_token must not be empty"))]
    pub refresh_token: String,
    /// Access token expiry (RFC 3339)
    pub expires_at: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Serialize)]
pub struct StoreTokensResponse {
    pub stored: bool,
}

/// Encrypt and persist the session user's OAuth tokens.
async fn store_tokens(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<StoreTokensRequest>,
) -> Result<Json<StoreTokensResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let expires_at = chrono::DateTime::parse_from_rfc3339(&body.expires_at)
        .map_err(|_| {
            AppError::BadRequest("Invalid 'expires_at': must be RFC3339 datetime".to_string())
        })?
        .with_timezone(&chrono::Utc);

    state
        .gmail_service
        .store_tokens(
            &user.email,
            &body.access_token,
            &body.refresh_token,
            expires_at,
            body.scopes,
        )
        .await?;

    tracing::info!(email = %user.email, "Stored tokens from identity provider");

    Ok(Json(StoreTokensResponse { stored: true }))
}

/// Report the session user's mailbox connection status.
async fn token_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<crate::services::gmail::TokenStatus>> {
    let status = state.gmail_service.token_status(&user.email).await?;
    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_and_decode_state_success() {
        let secret = b"secret_key";
        let frontend_url = "https://example.com";
        let timestamp = 1234567890u128;

        let payload = format!("{}|{:x}", frontend_url, timestamp);
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let state_data = format!("{}|{}", payload, signature);
        let encoded_state = URL_SAFE_NO_PAD.encode(state_data.as_bytes());

        let result = verify_and_decode_state(&encoded_state, secret);
        assert_eq!(result, Some(frontend_url.to_string()));
    }

    #[test]
    fn test_verify_and_decode_state_invalid_signature() {
        let secret = b"secret_key";
        let frontend_url = "https://example.com";
        let timestamp = 1234567890u128;

        let payload = format!("{}|{:x}", frontend_url, timestamp);
        let signature = "invalid_signature";

        let state_data = format!("{}|{}", payload, signature);
        let encoded_state = URL_SAFE_NO_PAD.encode(state_data.as_bytes());

        let result = verify_and_decode_state(&encoded_state, secret);
        assert_eq!(result, None);
    }

    #[test]
    fn test_verify_and_decode_state_wrong_secret() {
        let secret = b"secret_key";
        let wrong_secret = b"wrong_key";
        let frontend_url = "https://example.com";
        let timestamp = 1234567890u128;

        let payload = format!("{}|{:x}", frontend_url, timestamp);
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let state_data = format!("{}|{}", payload, signature);
        let encoded_state = URL_SAFE_NO_PAD.encode(state_data.as_bytes());

        let result = verify_and_decode_state(&encoded_state, wrong_secret);
        assert_eq!(result, None);
    }

    #[test]
    fn test_verify_and_decode_state_malformed() {
        let secret = b"secret_key";
        let encoded_state = URL_SAFE_NO_PAD.encode("invalid|format");
        let result = verify_and_decode_state(&encoded_state, secret);
        assert_eq!(result, None);
    }

    #[test]
    fn callback_url_uses_host_header() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            axum::http::header::HOST,
            "api.mailient.app".parse().unwrap(),
        );
        assert_eq!(
            callback_url_from_headers(&headers),
            "https://api.mailient.app/auth/google/callback"
        );

        let mut local = axum::http::HeaderMap::new();
        local.insert(axum::http::header::HOST, "localhost:8080".parse().unwrap());
        assert_eq!(
            callback_url_from_headers(&local),
            "http://localhost:8080/auth/google/callback"
        );
    }
}
