//! Concrete LLM provider clients.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use docent_core::{AppError, AppResult};
use serde::de::DeserializeOwned;

/// Decode a provider reply, turning non-2xx statuses into `AppError::Llm`.
pub(crate) async fn read_reply<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> AppResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(AppError::Llm(format!("{} returned {}: {}", provider, status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Llm(format!("Failed to parse {} reply: {}", provider, e)))
}
