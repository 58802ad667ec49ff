//! Embedding provider trait and factory.

use std::sync::Arc;
use std::time::Duration;

use docent_core::config::EmbeddingSettings;
use docent_core::{AppError, AppResult};
use reqwest::StatusCode;

use super::providers::{hash::HashProvider, ollama::OllamaProvider, openai::OpenAiProvider};

/// Result of one call to an embedding service.
///
/// Throttling is an expected outcome rather than an error: the caller
/// recovers from it with the local fallback embedding.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedOutcome {
    /// One vector per input, in input order (not yet fitted to `D`)
    Vectors(Vec<Vec<f32>>),

    /// The service refused the batch with a rate-limit or billing status
    Throttled { status: u16, detail: String },
}

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "openai", "ollama", "hash")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Embed a batch of texts with a single service call.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<EmbedOutcome>;
}

/// Statuses that trigger the local fallback instead of failing the request.
pub(crate) fn is_throttle_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::PAYMENT_REQUIRED
}

/// Create an embedding provider based on configuration.
pub fn create_provider(
    settings: &EmbeddingSettings,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let timeout = Duration::from_secs(settings.timeout_secs);

    match settings.provider.to_lowercase().as_str() {
        "openai" => {
            let key = api_key.ok_or_else(|| {
                AppError::Config("OpenAI embedding provider requires an API key".to_string())
            })?;
            let provider =
                OpenAiProvider::new(key, settings.endpoint.as_deref(), &settings.model, timeout)?;
            Ok(Arc::new(provider))
        }

        "ollama" => {
            let provider =
                OllamaProvider::new(settings.endpoint.as_deref(), &settings.model, timeout)?;
            Ok(Arc::new(provider))
        }

        "hash" => Ok(Arc::new(HashProvider::new(settings.dimensions))),

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: openai, ollama, hash",
            settings.provider
        ))),
    }
}
