//! Embedding client
//!
//! Calls an OpenAI-compatible `/v1/embeddings` endpoint and returns one
//! dense vector per request. The dimension check happens at the call site,
//! where the configured schema dimension is known.

use serde::{Deserialize, Serialize};

use crate::core::config::ModelConfig;

use super::error::ClientError;

/// Embedding service client. One request per chunk; batching is deliberate
/// serialism per document to keep failure handling simple.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
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
            "Embedding client initialized"
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

    /// Embed one text, returning the raw vector. Callers verify the
    /// dimension against the schema.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        let url = format!("{}/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
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

        let parsed: EmbeddingResponse = resp.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ClientError::UnexpectedResponse("empty embeddings data".to_string()))
    }
}
