//! Offline embedding provider.
//!
//! Produces the same deterministic SHA-256 embedding the engine uses as its
//! throttling fallback. Handy for local corpora and tests; it carries no
//! semantic signal, so ranking relies on the lexical half of the hybrid score.

use crate::embeddings::{fallback_embedding, EmbedOutcome, EmbeddingProvider};
use docent_core::AppResult;

#[derive(Debug, Clone)]
pub struct HashProvider {
    dimensions: usize,
}

impl HashProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashProvider {
    fn provider_name(&self) -> &str {
        "hash"
    }

    fn model_name(&self) -> &str {
        "sha256"
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<EmbedOutcome> {
        Ok(EmbedOutcome::Vectors(
            texts
                .iter()
                .map(|t| fallback_embedding(t, self.dimensions))
                .collect(),
        ))
    }
}
