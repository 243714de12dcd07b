//! Reasoning client
//!
//! Calls an OpenAI-compatible `/v1/chat/completions` endpoint and returns
//! the raw assistant text. JSON recovery happens downstream through the
//! lenient parser, never here.

use serde::{Deserialize, Serialize};

use crate::core::config::ModelConfig;

use super::error::ClientError;

/// Reasoning service client, single-flight per worker.
#[derive(Debug, Clone)]
pub struct ReasoningClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl ReasoningClient {
    pub fn new(config: &ModelConfig, timeout_s: u64) -> Result<Self, ClientError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| ClientError::Config(format!("invalid API key: {}", e)))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_s))
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;

        tracing::debug!(
            base_url = %config.base_url,
            model = %config.model,
            timeout_s,
            "Reasoning client initialized"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one prompt, returning the assistant's raw text.
    ///
    /// Temperature is pinned to zero: evaluation and extraction want the
    /// most deterministic output the model offers.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String, ClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: system,
                    },
                    ChatMessage {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: 0.0,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClientError::UnexpectedResponse("no completion choices".to_string()))
    }
}
