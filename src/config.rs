//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and cached in memory. In production,
//! Cloud Run injects them as environment variables via secret bindings.

use std::env;

/// Name of the Cloud Tasks queue used for mailbox sync and follow-up fan-out.
pub const OUTREACH_QUEUE_NAME: &str = "mailient-outreach";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID (public)
    pub google_client_id: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// Public base URL of this API (used for Cloud Tasks callbacks)
    pub api_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (KMS key ring, Cloud Tasks queue)
    pub gcp_region: String,
    /// Server port
    pub port: u16,
    /// Random path segment for the billing webhook URL
    pub billing_webhook_path_uuid: String,
    /// AI completion provider base URL (OpenAI-compatible)
    pub ai_api_base: String,
    /// AI model identifier
    pub ai_model: String,
    /// TTS provider base URL
    pub tts_api_base: String,
    /// Default TTS voice
    pub tts_voice_id: String,

    // --- Secrets (injected as env vars by secret bindings) ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for signing OAuth state parameters
    pub oauth_state_key: Vec<u8>,
    /// HMAC secret for verifying billing webhook signatures
    pub billing_webhook_secret: String,
    /// AI provider API key
    pub ai_api_key: String,
    /// TTS provider API key
    pub tts_api_key: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            billing_webhook_path_uuid: env::var("BILLING_WEBHOOK_PATH_UUID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("BILLING_WEBHOOK_PATH_UUID"))?,
            ai_api_base: env::var("AI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            ai_model: env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            tts_api_base: env::var("TTS_API_BASE")
                .unwrap_or_else(|_| "https://api.elevenlabs.io".to_string()),
            tts_voice_id: env::var("TTS_VOICE_ID")
                .unwrap_or_else(|_| "21m00Tcm4TlvDq8ikWAM".to_string()),

            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_SECRET"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
            billing_webhook_secret: env::var("BILLING_WEBHOOK_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("BILLING_WEBHOOK_SECRET"))?,
            ai_api_key: env::var("AI_API_KEY")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            tts_api_key: env::var("TTS_API_KEY")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
        })
    }

    /// Default config for tests only.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test_client_id".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            port: 8080,
            billing_webhook_path_uuid: "test-webhook-uuid".to_string(),
            ai_api_base: "http://localhost:9999/v1".to_string(),
            ai_model: "test-model".to_string(),
            tts_api_base: "http://localhost:9998".to_string(),
            tts_voice_id: "test-voice".to_string(),
            google_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_state_key".to_vec(),
            billing_webhook_secret: "test_billing_secret".to_string(),
            ai_api_key: "test_ai_key".to_string(),
            tts_api_key: "test_tts_key".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("GOOGLE_CLIENT_ID", "test_id");
        env::set_var("GOOGLE_CLIENT_SECRET", "test_secret");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("OAUTH_STATE_KEY", "test_state_key");
        env::set_var("BILLING_WEBHOOK_SECRET", "test_billing_secret");
        env::set_var("BILLING_WEBHOOK_PATH_UUID", "uuid-1234");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.google_client_id, "test_id");
        assert_eq!(config.google_client_secret, "test_secret");
        assert_eq!(config.billing_webhook_path_uuid, "uuid-1234");
        assert_eq!(config.port, 8080);
    }
}
