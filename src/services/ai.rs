// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI completion client (OpenAI-compatible chat completions).
//!
//! Used for reply drafting, note generation, and the SSE streaming
//! endpoint. Provider failures surface as `AppError::AiApi`.

use crate::error::AppError;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

const MAX_COMPLETION_TOKENS: u32 = 1024;

/// A single chat message sent to the completion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Streaming chunk from the provider's SSE body.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// AI completion service.
#[derive(Clone)]
pub struct AiService {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AiService {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    /// Run a blocking completion and return the assistant's text.
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, AppError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: MAX_COMPLETION_TOKENS,
            stream: None,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::AiApi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AiApi(format!("HTTP {}: {}", status, body)));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::AiApi(format!("JSON parse error: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::AiApi("Empty completion response".to_string()))
    }

    /// Run a streaming completion, yielding text deltas as they arrive.
    ///
    /// The provider emits `data: {json}` SSE lines terminated by
    /// `data: [DONE]`; anything unparseable is skipped.
    pub async fn stream(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<impl Stream<Item = Result<String, AppError>>, AppError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: MAX_COMPLETION_TOKENS,
            stream: Some(true),
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::AiApi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AiApi(format!("HTTP {}: {}", status, body)));
        }

        let bytes = Box::pin(response.bytes_stream());

        let deltas = futures_util::stream::unfold(
            (bytes, String::new()),
            |(mut bytes, mut buffer)| async move {
                loop {
                    if let Some(pos) = buffer.find('\n') {
                        let line: String = buffer.drain(..=pos).collect();
                        let line = line.trim();

                        let Some(data) = line.strip_prefix("data:") else {
                            continue;
                        };
                        let data = data.trim();

                        if data == "[DONE]" {
                            return None;
                        }

                        if let Some(content) = parse_stream_delta(data) {
                            return Some((Ok(content), (bytes, buffer)));
                        }
                        continue;
                    }

                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buffer.push_str(&String::from_utf8_lossy(&chunk));
                        }
                        Some(Err(e)) => {
                            return Some((
                                Err(AppError::AiApi(format!("Stream error: {}", e))),
                                (bytes, buffer),
                            ));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(deltas)
    }
}

/// Extract the text delta from one SSE data payload, if any.
fn parse_stream_delta(data: &str) -> Option<String> {
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stream_delta_with_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_stream_delta(data), Some("Hel".to_string()));
    }

    #[test]
    fn parse_stream_delta_role_only_chunk() {
        // First chunk carries only the role, no content
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_stream_delta(data), None);
    }

    #[test]
    fn parse_stream_delta_garbage() {
        assert_eq!(parse_stream_delta("not json"), None);
        assert_eq!(parse_stream_delta(r#"{"choices":[]}"#), None);
    }
}
