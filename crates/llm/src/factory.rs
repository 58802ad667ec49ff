//! LLM provider factory.
//!
//! This module creates LLM clients from the generation settings: provider
//! resolution, secret injection and request timeouts.

use std::sync::Arc;
use std::time::Duration;

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use docent_core::{AppError, AppResult};

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("openai", "ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (for providers that require it)
/// * `timeout` - Per-request timeout
///
/// # Errors
/// Returns a `Config` error if the provider is unknown or a required
/// secret is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    timeout: Duration,
) -> AppResult<Arc<dyn LlmClient>> {
    match ProviderType::parse(provider) {
        Some(ProviderType::Ollama) => Ok(Arc::new(OllamaClient::new(endpoint, timeout)?)),
        Some(ProviderType::OpenAI) => {
            let key = api_key.ok_or_else(|| {
                AppError::Config("OpenAI provider requires API key".to_string())
            })?;
            Ok(Arc::new(OpenAiClient::new(key, endpoint, timeout)?))
        }
        None => Err(AppError::Config(format!("Unknown provider: {}", provider))),
    }
}
