//! User, profile and token models for storage and API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User record stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Email address (also used as document ID, urlencoded)
    pub email: String,
    /// Display name from the Google userinfo endpoint
    pub name: String,
    /// Profile picture URL
    pub profile_picture: Option<String>,
    /// When the user first connected
    pub created_at: String,
    /// Last request timestamp
    pub last_active: String,
    /// Set when the user has asked for their account to be deleted
    pub deletion_requested_at: Option<String>,
}

/// User's OAuth tokens (encrypted in Firestore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTokens {
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64)
    pub refresh_token_encrypted: String,
    /// When the access token expires (ISO 8601)
    pub expires_at: String,
    /// Granted OAuth scopes
    pub scopes: Vec<String>,
}

/// Per-integration enabled flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Integrations {
    #[serde(default)]
    pub gmail: bool,
    #[serde(default)]
    pub calendar: bool,
}

/// User-facing profile and preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Owner email (document ID, urlencoded)
    pub email: String,
    /// Chosen username shown in the UI
    pub username: String,
    /// Whether onboarding has been completed
    #[serde(default)]
    pub onboarding_completed: bool,
    /// Opaque key/value preference bag (theme, signature, ...)
    #[serde(default)]
    pub preferences: HashMap<String, String>,
    /// Per-integration enabled flags
    #[serde(default)]
    pub integrations: Integrations,
    pub created_at: String,
    pub updated_at: String,
}

impl Profile {
    /// Fresh profile for a newly connected user.
    pub fn new(email: &str, username: &str, now: &str) -> Self {
        Self {
            email: email.to_string(),
            username: username.to_string(),
            onboarding_completed: false,
            preferences: HashMap::new(),
            integrations: Integrations {
                gmail: true,
                calendar: false,
            },
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}
