//! Embedding engine for the RAG pipeline.
//!
//! Wraps a provider and guarantees that every vector handed to the retriever
//! has exactly the configured dimensionality, recovering from throttled
//! service calls with a deterministic local embedding.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbedOutcome, EmbeddingProvider};

use std::sync::Arc;

use docent_core::{AppError, AppResult};
use sha2::{Digest, Sha256};

/// Vectors for a batch, flagged when the fallback embedding was used.
#[derive(Debug, Clone, PartialEq)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f32>>,
    pub degraded: bool,
}

/// Provider plus target dimensionality `D`.
#[derive(Debug, Clone)]
pub struct EmbeddingEngine {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
}

impl EmbeddingEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimensions: usize) -> Self {
        Self {
            provider,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed a batch of texts. Every returned vector has exactly `D` elements.
    pub async fn embed(&self, texts: &[String]) -> AppResult<Embeddings> {
        if texts.is_empty() {
            return Ok(Embeddings {
                vectors: Vec::new(),
                degraded: false,
            });
        }

        tracing::debug!(
            "Embedding {} texts using provider '{}' (model: {})",
            texts.len(),
            self.provider.provider_name(),
            self.provider.model_name()
        );

        match self.provider.embed_batch(texts).await? {
            EmbedOutcome::Vectors(vectors) => {
                if vectors.len() != texts.len() {
                    return Err(AppError::Embedding(format!(
                        "Provider returned {} embeddings for {} inputs",
                        vectors.len(),
                        texts.len()
                    )));
                }
                let vectors = vectors
                    .into_iter()
                    .map(|v| fit_dimensions(v, self.dimensions))
                    .collect();
                Ok(Embeddings {
                    vectors,
                    degraded: false,
                })
            }
            EmbedOutcome::Throttled { status, detail } => {
                tracing::warn!(
                    status,
                    detail = %detail,
                    provider = self.provider.provider_name(),
                    "Embedding service throttled the request, using local fallback embeddings"
                );
                let vectors = texts
                    .iter()
                    .map(|t| fallback_embedding(t, self.dimensions))
                    .collect();
                Ok(Embeddings {
                    vectors,
                    degraded: true,
                })
            }
        }
    }

    /// Embed a single query. Returns the vector and whether it is degraded.
    pub async fn embed_query(&self, text: &str) -> AppResult<(Vec<f32>, bool)> {
        let embeddings = self.embed(&[text.to_string()]).await?;
        let degraded = embeddings.degraded;
        let vector = embeddings
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))?;
        Ok((vector, degraded))
    }
}

/// Truncate or zero-pad a vector to exactly `dimensions` elements.
pub fn fit_dimensions(mut vector: Vec<f32>, dimensions: usize) -> Vec<f32> {
    vector.truncate(dimensions);
    vector.resize(dimensions, 0.0);
    vector
}

/// Deterministic embedding derived from the SHA-256 digest of `text`.
///
/// Digest bytes are repeated cyclically to `dimensions` values, each mapped
/// from `[0, 255]` to `[-1, 1]`.
pub fn fallback_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    digest
        .iter()
        .cycle()
        .take(dimensions)
        .map(|&byte| (byte as f32 / 255.0) * 2.0 - 1.0)
        .collect()
}
