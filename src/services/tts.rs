// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Text-to-speech provider client.
//!
//! Audio bytes are passed through from the provider unmodified.

use crate::error::AppError;

/// Synthesized audio with its upstream content type.
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// TTS provider client.
#[derive(Clone)]
pub struct TtsService {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    default_voice_id: String,
}

impl TtsService {
    pub fn new(base_url: String, api_key: String, default_voice_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            default_voice_id,
        }
    }

    /// Synthesize narration audio for `text`.
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<SynthesizedAudio, AppError> {
        let voice = voice_id.unwrap_or(&self.default_voice_id);
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice);

        let body = serde_json::json!({
            "text": text,
            "model_id": "eleven_multilingual_v2",
        });

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::TtsApi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::TtsApi(format!("HTTP {}: {}", status, body)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::TtsApi(format!("Body read error: {}", e)))?
            .to_vec();

        Ok(SynthesizedAudio {
            bytes,
            content_type,
        })
    }
}
