// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Gmail API client and token lifecycle.
//!
//! Handles:
//! - Message listing/fetching and attachment passthrough
//! - Sending RFC 2822 messages
//! - OAuth code exchange and userinfo lookup
//! - Token refresh when expired (single attempt, write-back on success)
//! - Revocation on disconnect

use crate::error::AppError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// OAuth scopes requested at sign-in.
pub const OAUTH_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/calendar.readonly",
];

/// Gmail REST API client.
#[derive(Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl GmailClient {
    /// Create a new Gmail client with OAuth credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
            client_id,
            client_secret,
        }
    }

    /// List message IDs in the user's mailbox (paginated).
    pub async fn list_messages(
        &self,
        access_token: &str,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessageListResponse, AppError> {
        let url = format!("{}/users/me/messages", self.base_url);

        let mut params = vec![("maxResults", max_results.to_string())];
        if let Some(q) = query {
            params.push(("q", q.to_string()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::GmailApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Get a full message by ID.
    pub async fn get_message(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<GmailMessage, AppError> {
        let url = format!("{}/users/me/messages/{}", self.base_url, message_id);
        self.get_json(&url, access_token).await
    }

    /// Fetch attachment bytes. Passed through to the caller unmodified.
    pub async fn get_attachment(
        &self,
        access_token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, AppError> {
        let url = format!(
            "{}/users/me/messages/{}/attachments/{}",
            self.base_url, message_id, attachment_id
        );
        let body: AttachmentBody = self.get_json(&url, access_token).await?;

        URL_SAFE_NO_PAD
            .decode(body.data.trim_end_matches('='))
            .map_err(|e| AppError::GmailApi(format!("Attachment decode error: {}", e)))
    }

    /// Send an RFC 2822 message.
    pub async fn send_message(
        &self,
        access_token: &str,
        rfc2822: &[u8],
    ) -> Result<SendMessageResponse, AppError> {
        let url = format!("{}/users/me/messages/send", self.base_url);

        let body = serde_json::json!({
            "raw": URL_SAFE_NO_PAD.encode(rfc2822),
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GmailApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Get the authenticated mailbox profile.
    pub async fn get_mailbox_profile(
        &self,
        access_token: &str,
    ) -> Result<MailboxProfile, AppError> {
        let url = format!("{}/users/me/profile", self.base_url);
        self.get_json(&url, access_token).await
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::GmailApi(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // invalid_grant means the refresh token is revoked or expired:
            // the sole recovery mechanism is gone, the user must re-auth.
            if body.contains("invalid_grant") {
                return Err(AppError::GmailApi("invalid_grant".to_string()));
            }
            return Err(AppError::GmailApi(format!(
                "Token refresh failed with HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::GmailApi(format!("JSON parse error: {}", e)))
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenExchangeResponse, AppError> {
        let response = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::GmailApi(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Google token exchange failed");
            return Err(AppError::GmailApi(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::GmailApi(format!("Failed to parse token response: {}", e)))
    }

    /// Resolve the signed-in user via the OpenID userinfo endpoint.
    pub async fn get_userinfo(&self, access_token: &str) -> Result<UserInfo, AppError> {
        let response = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::GmailApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Revoke a token (access or refresh) at Google.
    ///
    /// This invalidates the whole grant; the user must re-consent.
    pub async fn revoke(&self, token: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(GOOGLE_REVOKE_URL)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| AppError::GmailApi(format!("Revocation request failed: {}", e)))?;

        self.check_response(response).await?;
        tracing::info!("Google token revocation successful");
        Ok(())
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::GmailApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check response status and return error if not successful.
    async fn check_response(&self, response: reqwest::Response) -> Result<(), AppError> {
        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            tracing::warn!("Gmail rate limit hit (429)");
            return Err(AppError::GmailApi(format!("HTTP 429: {}", body)));
        }

        // Unauthorized - token may be expired or revoked
        if status.as_u16() == 401 {
            return Err(AppError::GmailApi(
                AppError::GMAIL_TOKEN_ERROR.to_string(),
            ));
        }

        if status.as_u16() == 404 {
            return Err(AppError::NotFound("Gmail resource".to_string()));
        }

        Err(AppError::GmailApi(format!("HTTP {}: {}", status, body)))
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Gmail rate limit hit (429)");
                return Err(AppError::GmailApi(format!("HTTP 429: {}", body)));
            }

            if status.as_u16() == 401 {
                return Err(AppError::GmailApi(
                    AppError::GMAIL_TOKEN_ERROR.to_string(),
                ));
            }

            if status.as_u16() == 404 {
                return Err(AppError::NotFound("Gmail resource".to_string()));
            }

            return Err(AppError::GmailApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::GmailApi(format!("JSON parse error: {}", e)))
    }
}

/// Token refresh response from Google.
///
/// Unlike the exchange response, a refresh normally does not rotate the
/// refresh token, and expiry arrives as a relative `expires_in`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Token exchange response from the authorization-code grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub expires_in: i64,
    /// Only present when the user granted offline access in this consent
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// OpenID userinfo response.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Message list page from Gmail.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListResponse {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Message ID reference in a list page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

/// Full Gmail message resource (the fields we consume).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    /// Millisecond epoch as a decimal string
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

impl GmailMessage {
    /// Look up a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref().and_then(|p| {
            p.headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.as_str())
        })
    }

    /// Message date as UTC, from Gmail's internalDate.
    pub fn date_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let millis: i64 = self.internal_date.as_deref()?.parse().ok()?;
        chrono::DateTime::from_timestamp_millis(millis)
    }

    /// Project this message into a cached record for `owner`.
    pub fn to_cached_email(&self, owner: &str, synced_at: &str) -> crate::models::CachedEmail {
        crate::models::CachedEmail {
            message_id: self.id.clone(),
            owner: owner.to_string(),
            thread_id: self.thread_id.clone(),
            from: self.header("From").unwrap_or_default().to_string(),
            to: self.header("To").unwrap_or_default().to_string(),
            subject: self.header("Subject").unwrap_or_default().to_string(),
            snippet: self.snippet.clone(),
            date: self
                .date_utc()
                .map(crate::time_utils::format_utc_rfc3339)
                .unwrap_or_else(|| synced_at.to_string()),
            label_ids: self.label_ids.clone(),
            is_sent: self.label_ids.iter().any(|l| l == "SENT"),
            synced_at: synced_at.to_string(),
        }
    }
}

/// MIME part of a message payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    #[serde(default)]
    pub body: Option<MessagePartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

/// A single message header.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

/// Body of a MIME part.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePartBody {
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Attachment bytes response (base64url).
#[derive(Debug, Clone, Deserialize)]
struct AttachmentBody {
    data: String,
}

/// Send response from Gmail.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub id: String,
    pub thread_id: String,
}

/// Mailbox profile from Gmail.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxProfile {
    pub email_address: String,
    #[serde(default)]
    pub messages_total: Option<u64>,
}

/// Assemble an RFC 2822 message for the Gmail send endpoint.
pub fn build_rfc2822(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    in_reply_to: Option<&str>,
) -> Vec<u8> {
    let mut message = String::new();
    message.push_str(&format!("From: {}\r\n", from));
    message.push_str(&format!("To: {}\r\n", to));
    message.push_str(&format!("Subject: {}\r\n", subject));
    if let Some(message_id) = in_reply_to {
        message.push_str(&format!("In-Reply-To: {}\r\n", message_id));
        message.push_str(&format!("References: {}\r\n", message_id));
    }
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n");
    message.push_str("\r\n");
    message.push_str(body);
    message.into_bytes()
}

// ─────────────────────────────────────────────────────────────────────────────
// GmailService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::FirestoreDb;
use crate::models::{Profile, User, UserTokens};
use crate::services::kms::{token_aad, KmsService};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Cached access token with expiry information.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Shared token cache type for use in AppState.
pub type TokenCache = Arc<DashMap<String, CachedToken>>;

/// Shared refresh locks type for use in AppState.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Connection status reported by the token storage endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TokenStatus {
    pub connected: bool,
    pub expired: bool,
    pub expires_at: Option<String>,
}

/// High-level Gmail service that manages token lifecycle and API calls.
///
/// This service encapsulates:
/// - Token retrieval and decryption from Firestore
/// - Automatic token refresh when expiring (with 5-minute margin)
/// - Re-encryption and storage of refreshed tokens
/// - In-memory token caching to reduce KMS calls
/// - Per-user locking to prevent duplicate refresh calls
/// - Gmail API calls on behalf of a user
#[derive(Clone)]
pub struct GmailService {
    client: GmailClient,
    db: FirestoreDb,
    kms: KmsService,
    /// In-memory cache of decrypted access tokens (shared across requests).
    token_cache: TokenCache,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
}

impl GmailService {
    /// Create a new Gmail service with shared token cache.
    ///
    /// The `token_cache` and `refresh_locks` should be shared across all
    /// `GmailService` instances within a server instance.
    pub fn new(
        client_id: String,
        client_secret: String,
        db: FirestoreDb,
        kms: KmsService,
        token_cache: TokenCache,
        refresh_locks: RefreshLocks,
    ) -> Self {
        Self {
            client: GmailClient::new(client_id, client_secret),
            db,
            kms,
            token_cache,
            refresh_locks,
        }
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a valid (non-expired) access token for the given user.
    ///
    /// Strategy:
    /// 1. Check in-memory cache (fast path - no I/O)
    /// 2. Acquire per-user lock to prevent duplicate refresh calls
    /// 3. Re-check cache after lock (another task may have refreshed)
    /// 4. Fetch from Firestore; a missing record is reported as
    ///    `ReauthRequired` (no connection), distinct from an expired one
    /// 5. If token is valid, decrypt lazily, cache and return
    /// 6. If expired, decrypt refresh token and refresh with Google
    ///    (single attempt); `invalid_grant` surfaces `ReauthRequired`
    /// 7. Handle cross-instance refresh races via re-read from Firestore
    pub async fn get_valid_access_token(&self, email: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        // STEP 1: Check cache (fast path - no I/O)
        if let Some(cached) = self.token_cache.get(email) {
            if now + margin < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
            // Token expired or expiring soon - fall through to refresh
        }

        // STEP 2: Acquire per-user refresh lock.
        // This ensures only one task per user performs the refresh.
        let lock = self
            .refresh_locks
            .entry(email.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock().await;

        // STEP 3: Re-check cache after acquiring lock (double-check).
        // Another task may have refreshed while we were waiting.
        if let Some(cached) = self.token_cache.get(email) {
            if now + margin < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        // STEP 4: Fetch from Firestore. Absence means the user never
        // connected (or disconnected) - distinct from an expired token.
        let tokens = self.db.get_tokens(email).await?.ok_or_else(|| {
            tracing::info!(email, "No stored tokens, re-authentication required");
            AppError::ReauthRequired
        })?;

        let aad = token_aad(email);

        // LAZY DECRYPTION: Only decrypt the access token first
        let access_token = self
            .kms
            .decrypt_with_fallback(&tokens.access_token_encrypted, Some(&aad))
            .await?;

        let expires_at = DateTime::parse_from_rfc3339(&tokens.expires_at)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to parse expiry: {}", e)))?
            .with_timezone(&Utc);

        // STEP 5: Check if refresh is needed
        if now + margin < expires_at {
            self.token_cache.insert(
                email.to_string(),
                CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                },
            );
            return Ok(access_token);
        }

        // STEP 6: Token expired - decrypt refresh token and refresh
        tracing::info!(email, "Access token expired, refreshing");

        let refresh_token = self
            .kms
            .decrypt_with_fallback(&tokens.refresh_token_encrypted, Some(&aad))
            .await?;

        // Handle cross-instance race: if another server instance already
        // refreshed and Google rotated the grant, our old refresh token is
        // rejected. In that case, read the winner's tokens from Firestore.
        let new_tokens = match self.client.refresh_token(&refresh_token).await {
            Ok(t) => t,
            Err(AppError::GmailApi(ref msg)) if msg.contains("invalid_grant") => {
                tracing::info!(
                    email,
                    "Refresh rejected (invalid_grant), checking for a newer stored grant"
                );
                return self.fetch_fresh_from_db(email, now, margin).await;
            }
            Err(e) => return Err(e),
        };

        // STEP 7: Encrypt and store new tokens. Google does not normally
        // rotate the refresh token on refresh; keep the stored one then.
        let new_expires_at = now + Duration::seconds(new_tokens.expires_in);

        let new_enc_access = self
            .kms
            .encrypt(&new_tokens.access_token, Some(&aad))
            .await?;
        let new_enc_refresh = match &new_tokens.refresh_token {
            Some(rotated) => self.kms.encrypt(rotated, Some(&aad)).await?,
            None => tokens.refresh_token_encrypted.clone(),
        };

        let updated_tokens = UserTokens {
            access_token_encrypted: new_enc_access,
            refresh_token_encrypted: new_enc_refresh,
            expires_at: new_expires_at.to_rfc3339(),
            scopes: tokens.scopes.clone(),
        };

        self.db.set_tokens(email, &updated_tokens).await?;

        // STEP 8: Update cache with new token
        self.token_cache.insert(
            email.to_string(),
            CachedToken {
                access_token: new_tokens.access_token.clone(),
                expires_at: new_expires_at,
            },
        );

        tracing::info!(email, "Token refreshed and cached");
        Ok(new_tokens.access_token)
    }

    /// Re-read tokens from Firestore after a cross-instance refresh race.
    ///
    /// Only returns a token that is actually still valid; if the stored
    /// record is expired too, the grant is gone for good and the caller
    /// must re-authenticate. A failed refresh never yields a stale token.
    async fn fetch_fresh_from_db(
        &self,
        email: &str,
        now: DateTime<Utc>,
        margin: Duration,
    ) -> Result<String, AppError> {
        let tokens = self
            .db
            .get_tokens(email)
            .await?
            .ok_or(AppError::ReauthRequired)?;

        let expires_at = DateTime::parse_from_rfc3339(&tokens.expires_at)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to parse expiry: {}", e)))?
            .with_timezone(&Utc);

        if now + margin >= expires_at {
            // Nobody else refreshed; our refresh token is simply dead.
            tracing::warn!(email, "Refresh token revoked, re-authentication required");
            return Err(AppError::ReauthRequired);
        }

        let aad = token_aad(email);
        let access_token = self
            .kms
            .decrypt_with_fallback(&tokens.access_token_encrypted, Some(&aad))
            .await?;

        self.token_cache.insert(
            email.to_string(),
            CachedToken {
                access_token: access_token.clone(),
                expires_at,
            },
        );

        Ok(access_token)
    }

    /// Encrypt and persist a token set for a user.
    ///
    /// Used by the OAuth callback and the token storage endpoint.
    pub async fn store_tokens(
        &self,
        email: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> Result<(), AppError> {
        let (enc_access, enc_refresh) =
            crate::services::kms::encrypt_tokens(&self.kms, access_token, refresh_token, email)
                .await?;

        let tokens = UserTokens {
            access_token_encrypted: enc_access,
            refresh_token_encrypted: enc_refresh,
            expires_at: expires_at.to_rfc3339(),
            scopes,
        };

        self.db.set_tokens(email, &tokens).await?;

        self.token_cache.insert(
            email.to_string(),
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
            },
        );

        Ok(())
    }

    /// Report connection status without ever returning token material.
    pub async fn token_status(&self, email: &str) -> Result<TokenStatus, AppError> {
        let Some(tokens) = self.db.get_tokens(email).await? else {
            return Ok(TokenStatus {
                connected: false,
                expired: false,
                expires_at: None,
            });
        };

        let expired = DateTime::parse_from_rfc3339(&tokens.expires_at)
            .map(|dt| Utc::now() >= dt.with_timezone(&Utc))
            .unwrap_or(true);

        Ok(TokenStatus {
            connected: true,
            expired,
            expires_at: Some(tokens.expires_at),
        })
    }

    // ─── OAuth Callback Handling ─────────────────────────────────────────────

    /// Handle OAuth callback: exchange code, resolve user, store everything.
    ///
    /// Returns the user's email and display name for session creation.
    pub async fn handle_oauth_callback(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthResult, AppError> {
        let token_response = self.client.exchange_code(code, redirect_uri).await?;

        let userinfo = self.client.get_userinfo(&token_response.access_token).await?;
        let email = userinfo.email.clone();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        // Store user record
        let user = User {
            email: email.clone(),
            name: userinfo.name.clone().unwrap_or_else(|| email.clone()),
            profile_picture: userinfo.picture.clone(),
            created_at: self
                .db
                .get_user(&email)
                .await
                .ok()
                .flatten()
                .map(|u| u.created_at)
                .unwrap_or_else(|| now_str.clone()),
            last_active: now_str.clone(),
            deletion_requested_at: None,
        };

        if let Err(e) = self.db.upsert_user(&user).await {
            tracing::warn!(error = %e, "Failed to store user record, continuing anyway");
        }

        // Create the profile on first sign-in
        match self.db.get_profile(&email).await {
            Ok(None) => {
                let username = email.split('@').next().unwrap_or(&email);
                let profile = Profile::new(&email, username, &now_str);
                if let Err(e) = self.db.set_profile(&profile).await {
                    tracing::warn!(error = %e, "Failed to create profile, continuing anyway");
                }
            }
            Ok(Some(_)) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load profile, continuing anyway");
            }
        }

        // Google only returns a refresh token on the consent that granted
        // offline access; on a repeat sign-in, keep the one already stored.
        let refresh_token = match token_response.refresh_token.clone() {
            Some(t) => t,
            None => {
                let existing = self.db.get_tokens(&email).await?.ok_or_else(|| {
                    AppError::BadRequest(
                        "Google did not return a refresh token and none is stored; \
                         re-consent with offline access"
                            .to_string(),
                    )
                })?;
                let aad = token_aad(&email);
                self.kms
                    .decrypt_with_fallback(&existing.refresh_token_encrypted, Some(&aad))
                    .await?
            }
        };

        let expires_at = now + Duration::seconds(token_response.expires_in);
        let scopes = token_response
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(String::from)
            .collect();

        self.store_tokens(
            &email,
            &token_response.access_token,
            &refresh_token,
            expires_at,
            scopes,
        )
        .await?;

        tracing::info!(email = %email, "OAuth callback handled, user and tokens stored");

        Ok(OAuthResult {
            email,
            name: userinfo.name.unwrap_or_default(),
            picture: userinfo.picture,
        })
    }

    // ─── API Wrappers ────────────────────────────────────────────────────────

    /// List message IDs in the user's mailbox.
    pub async fn list_messages(
        &self,
        email: &str,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessageListResponse, AppError> {
        let access_token = self.get_valid_access_token(email).await?;
        self.map_token_errors(
            self.client
                .list_messages(&access_token, query, page_token, max_results)
                .await,
        )
    }

    /// Get a full message.
    pub async fn get_message(&self, email: &str, message_id: &str) -> Result<GmailMessage, AppError> {
        let access_token = self.get_valid_access_token(email).await?;
        self.map_token_errors(self.client.get_message(&access_token, message_id).await)
    }

    /// Fetch attachment bytes (passthrough).
    pub async fn get_attachment(
        &self,
        email: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, AppError> {
        let access_token = self.get_valid_access_token(email).await?;
        self.map_token_errors(
            self.client
                .get_attachment(&access_token, message_id, attachment_id)
                .await,
        )
    }

    /// Send an RFC 2822 message on behalf of the user.
    pub async fn send_message(
        &self,
        email: &str,
        rfc2822: &[u8],
    ) -> Result<SendMessageResponse, AppError> {
        let access_token = self.get_valid_access_token(email).await?;
        self.map_token_errors(self.client.send_message(&access_token, rfc2822).await)
    }

    /// Fetch the Google profile picture URL for a user.
    pub async fn fetch_profile_picture(&self, email: &str) -> Result<Option<String>, AppError> {
        let access_token = self.get_valid_access_token(email).await?;
        let userinfo = self.map_token_errors(self.client.get_userinfo(&access_token).await)?;
        Ok(userinfo.picture)
    }

    /// A Gmail 401 after a fresh refresh means the grant was revoked
    /// out-of-band; surface the re-authentication condition.
    fn map_token_errors<T>(&self, result: Result<T, AppError>) -> Result<T, AppError> {
        result.map_err(|e| {
            if e.is_gmail_token_error() {
                AppError::ReauthRequired
            } else {
                e
            }
        })
    }

    // ─── Disconnect ──────────────────────────────────────────────────────────

    /// Delete local tokens and revoke the grant at Google.
    ///
    /// 1. Reads tokens from DB.
    /// 2. Deletes tokens from DB and cache immediately (blocks concurrent use).
    /// 3. Decrypts and revokes the refresh token at Google (best-effort).
    pub async fn revoke_and_delete_tokens(&self, email: &str) -> Result<(), AppError> {
        let tokens_opt = self.db.get_tokens(email).await?;
        let tokens = match tokens_opt {
            Some(t) => t,
            None => return Ok(()),
        };

        self.db.delete_tokens(email).await?;
        self.token_cache.remove(email);

        let aad = token_aad(email);
        let refresh_token = match self
            .kms
            .decrypt_with_fallback(&tokens.refresh_token_encrypted, Some(&aad))
            .await
        {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, email, "Failed to decrypt tokens (skipping revocation)");
                return Ok(());
            }
        };

        // Revoking the refresh token invalidates the whole grant.
        if let Err(e) = self.client.revoke(&refresh_token).await {
            tracing::warn!(error = %e, email, "Google revocation failed (tokens already deleted)");
        }

        Ok(())
    }
}

/// Result of handling the OAuth callback.
#[derive(Debug, Clone)]
pub struct OAuthResult {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2822_basic_message() {
        let raw = build_rfc2822(
            "ada@example.com",
            "grace@example.com",
            "Hello",
            "Body text",
            None,
        );
        let text = String::from_utf8(raw).unwrap();

        assert!(text.starts_with("From: ada@example.com\r\n"));
        assert!(text.contains("To: grace@example.com\r\n"));
        assert!(text.contains("Subject: Hello\r\n"));
        assert!(!text.contains("In-Reply-To"));
        assert!(text.ends_with("\r\nBody text"));
    }

    #[test]
    fn rfc2822_reply_headers() {
        let raw = build_rfc2822(
            "ada@example.com",
            "grace@example.com",
            "Re: Hello",
            "Reply",
            Some("<abc123@mail.gmail.com>"),
        );
        let text = String::from_utf8(raw).unwrap();

        assert!(text.contains("In-Reply-To: <abc123@mail.gmail.com>\r\n"));
        assert!(text.contains("References: <abc123@mail.gmail.com>\r\n"));
    }

    #[test]
    fn gmail_message_header_lookup_and_projection() {
        let message: GmailMessage = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "threadId": "t1",
            "snippet": "hey there",
            "labelIds": ["INBOX", "UNREAD"],
            "internalDate": "1767225600000",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    {"name": "From", "value": "Grace <grace@example.com>"},
                    {"name": "To", "value": "ada@example.com"},
                    {"name": "subject", "value": "Hello Ada"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(message.header("Subject"), Some("Hello Ada"));
        assert_eq!(message.header("FROM"), Some("Grace <grace@example.com>"));
        assert_eq!(message.header("Cc"), None);

        let cached = message.to_cached_email("ada@example.com", "2026-01-01T00:00:00Z");
        assert_eq!(cached.message_id, "m1");
        assert_eq!(cached.thread_id, "t1");
        assert!(!cached.is_sent);
        assert_eq!(cached.date, "2026-01-01T00:00:00Z");
        assert_eq!(cached.subject, "Hello Ada");
    }

    #[test]
    fn sent_label_marks_message_as_sent() {
        let message: GmailMessage = serde_json::from_value(serde_json::json!({
            "id": "m2",
            "threadId": "t2",
            "labelIds": ["SENT"]
        }))
        .unwrap();

        let cached = message.to_cached_email("ada@example.com", "2026-01-01T00:00:00Z");
        assert!(cached.is_sent);
    }
}
