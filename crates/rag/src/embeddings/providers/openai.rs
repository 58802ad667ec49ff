//! OpenAI-compatible embedding provider.
//!
//! Sends `{model, input: [...]}` to `<base>/embeddings` and reads
//! `{data: [{embedding, index}]}` back.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::embeddings::provider::is_throttle_status;
use crate::embeddings::{EmbedOutcome, EmbeddingProvider};
use docent_core::{AppError, AppResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl OpenAiProvider {
    /// Build a client for `<base_url>/embeddings`.
    pub fn new(
        api_key: &str,
        base_url: Option<&str>,
        model: &str,
        timeout: Duration,
    ) -> AppResult<Self> {
        if api_key.trim().is_empty() {
            return Err(AppError::Config("missing OpenAI API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(AppError::Config("missing embedding model name".to_string()));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| AppError::Config("invalid OpenAI API key".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                AppError::Embedding(format!("Failed to build OpenAI HTTP client: {}", e))
            })?;

        let base = base_url.unwrap_or(DEFAULT_BASE_URL);
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "openai", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<EmbedOutcome> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Embedding(format!("Failed to call OpenAI embeddings: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            if is_throttle_status(status) {
                return Ok(EmbedOutcome::Throttled {
                    status: status.as_u16(),
                    detail: body,
                });
            }
            return Err(AppError::Embedding(format!(
                "OpenAI embeddings request failed ({}): {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Embedding(format!("Failed to parse OpenAI embedding response: {}", e))
        })?;

        if parsed.data.iter().all(|entry| entry.index.is_some()) {
            parsed.data.sort_by_key(|entry| entry.index);
        }

        debug!("Received {} embeddings", parsed.data.len());

        Ok(EmbedOutcome::Vectors(
            parsed.data.into_iter().map(|entry| entry.embedding).collect(),
        ))
    }
}
