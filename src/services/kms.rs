// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud KMS service for encrypting/decrypting OAuth tokens.
//!
//! Uses direct KMS encryption (not envelope encryption) for simplicity.
//! Tokens are bound to their owner via additional authenticated data, so a
//! ciphertext copied onto another user's record fails to decrypt. Records
//! written before AAD was introduced decrypt via a legacy fallback.

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// KMS encryption service.
#[derive(Clone)]
pub struct KmsService {
    /// Full resource path to the KMS key
    /// Format: projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}
    key_path: String,

    /// GCP KMS client
    client: Option<std::sync::Arc<google_cloud_kms::client::Client>>,
}

impl KmsService {
    /// KMS Key Ring Name
    const KEY_RING_NAME: &str = "mailient";

    /// Mock ciphertext prefixes (debug/test builds).
    #[cfg(debug_assertions)]
    const MOCK_AAD_PREFIX: &str = "AAD:";
    #[cfg(debug_assertions)]
    const MOCK_NO_AAD_PREFIX: &str = "NOAAD:";

    /// Create a new KMS service.
    /// Connects to GCP KMS.
    pub async fn new(project_id: &str, location: &str, key_name: &str) -> Result<Self, AppError> {
        let key_path = format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            project_id,
            location,
            Self::KEY_RING_NAME,
            key_name
        );

        let config = google_cloud_kms::client::ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS auth config: {}", e))
            })?;

        let client = google_cloud_kms::client::Client::new(config)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS client: {}", e))
            })?;

        Ok(Self {
            key_path,
            client: Some(std::sync::Arc::new(client)),
        })
    }

    /// Create a mock KMS service for testing (offline mode).
    /// Only available in debug/test builds.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            key_path: "projects/mock/locations/mock/keyRings/mock/cryptoKeys/mock".to_string(),
            client: None,
        }
    }

    /// Encrypt plaintext data using KMS, optionally bound to AAD.
    /// Returns base64-encoded ciphertext.
    pub async fn encrypt(&self, plaintext: &str, aad: Option<&[u8]>) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::EncryptRequest;

        // Mock mode (Debug builds only)
        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                let encoded = BASE64.encode(plaintext);
                return Ok(match aad {
                    Some(aad) => {
                        format!("{}{}:{}", Self::MOCK_AAD_PREFIX, hex::encode(aad), encoded)
                    }
                    None => format!("{}{}", Self::MOCK_NO_AAD_PREFIX, encoded),
                });
            }
        }

        // Production/Real mode
        // In release builds, this check ensures we return an error if the
        // client is missing, preventing insecure operations.
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let req = EncryptRequest {
            name: self.key_path.clone(),
            plaintext: plaintext.as_bytes().to_vec(),
            additional_authenticated_data: aad.map(|a| a.to_vec()).unwrap_or_default(),
            ..Default::default()
        };

        let response = client
            .encrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS encrypt failed: {}", e)))?;

        let ciphertext = response.ciphertext; // Vec<u8>
        Ok(BASE64.encode(ciphertext))
    }

    /// Decrypt ciphertext using KMS with the same AAD it was encrypted with.
    /// Expects base64-encoded ciphertext.
    pub async fn decrypt(
        &self,
        ciphertext_b64: &str,
        aad: Option<&[u8]>,
    ) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::DecryptRequest;

        // Mock mode (Debug builds only)
        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                return Self::mock_decrypt(ciphertext_b64, aad);
            }
        }

        // Production/Real mode
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Base64 output decode failed: {}", e))
        })?;

        let req = DecryptRequest {
            name: self.key_path.clone(),
            ciphertext,
            additional_authenticated_data: aad.map(|a| a.to_vec()).unwrap_or_default(),
            ..Default::default()
        };

        let response = client
            .decrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS decrypt failed: {}", e)))?;

        // response.plaintext is Vec<u8>
        String::from_utf8(response.plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }

    /// Decrypt, falling back to a legacy (no-AAD) decrypt for records
    /// written before token ciphertexts were bound to their owner.
    pub async fn decrypt_with_fallback(
        &self,
        ciphertext_b64: &str,
        aad: Option<&[u8]>,
    ) -> Result<String, AppError> {
        match self.decrypt(ciphertext_b64, aad).await {
            Ok(plaintext) => Ok(plaintext),
            Err(primary_err) => {
                if aad.is_none() {
                    return Err(primary_err);
                }
                tracing::debug!("AAD decrypt failed, attempting legacy (no-AAD) decrypt");
                self.decrypt(ciphertext_b64, None).await
            }
        }
    }

    /// Mock decrypt honoring the AAD binding (debug/test builds).
    #[cfg(debug_assertions)]
    fn mock_decrypt(ciphertext_b64: &str, aad: Option<&[u8]>) -> Result<String, AppError> {
        let decode = |b64: &str| -> Result<String, AppError> {
            let bytes = BASE64.decode(b64).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Base64 output decode failed (mock): {}", e))
            })?;
            String::from_utf8(bytes).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("UTF-8 decode failed (mock): {}", e))
            })
        };

        if let Some(rest) = ciphertext_b64.strip_prefix(Self::MOCK_AAD_PREFIX) {
            let (aad_hex, encoded) = rest.split_once(':').ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("Malformed mock AAD ciphertext"))
            })?;
            let expected = aad.map(hex::encode).unwrap_or_default();
            if expected != aad_hex {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Mock KMS AAD mismatch"
                )));
            }
            return decode(encoded);
        }

        if let Some(encoded) = ciphertext_b64.strip_prefix(Self::MOCK_NO_AAD_PREFIX) {
            if aad.is_some() {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Mock KMS AAD mismatch (ciphertext has no AAD)"
                )));
            }
            return decode(encoded);
        }

        // Raw legacy data: bare base64 written before the mock recorded AAD.
        if aad.is_some() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Mock KMS AAD mismatch (legacy ciphertext)"
            )));
        }
        decode(ciphertext_b64)
    }
}

/// AAD binding a token ciphertext to its owning user.
pub fn token_aad(email: &str) -> Vec<u8> {
    format!("user:{}", email).into_bytes()
}

/// Helper to encrypt OAuth tokens before storing.
pub async fn encrypt_tokens(
    kms: &KmsService,
    access_token: &str,
    refresh_token: &str,
    email: &str,
) -> Result<(String, String), AppError> {
    let aad = token_aad(email);
    let encrypted_access = kms.encrypt(access_token, Some(&aad)).await?;
    let encrypted_refresh = kms.encrypt(refresh_token, Some(&aad)).await?;
    Ok((encrypted_access, encrypted_refresh))
}

/// Helper to decrypt OAuth tokens after retrieval.
pub async fn decrypt_tokens(
    kms: &KmsService,
    encrypted_access: &str,
    encrypted_refresh: &str,
    email: &str,
) -> Result<(String, String), AppError> {
    let aad = token_aad(email);
    let access_token = kms.decrypt_with_fallback(encrypted_access, Some(&aad)).await?;
    let refresh_token = kms
        .decrypt_with_fallback(encrypted_refresh, Some(&aad))
        .await?;
    Ok((access_token, refresh_token))
}
