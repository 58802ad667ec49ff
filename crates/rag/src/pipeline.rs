//! Per-request orchestration of the answering pipeline.
//!
//! A request moves through `Validate → Embed → Retrieve → Rank → Rerank →
//! Synthesize → BuildCitations → Persist`. Every stage is fatal on error
//! except `Rerank`, which degrades inside the re-ranker, and `Persist`,
//! which logs and marks the response as not persisted.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::citations::CitationBuilder;
use crate::embeddings::EmbeddingEngine;
use crate::rank::rank;
use crate::rerank::Reranker;
use crate::retrieval::CandidateRetriever;
use crate::session::{Message, ResponseMetadata, SessionStore};
use crate::synthesize::Synthesizer;
use crate::types::Citation;
use docent_core::{AppError, AppResult, CancelSignal};

/// Longest accepted question, in characters after trimming.
pub const MAX_QUESTION_CHARS: usize = 2000;

/// Model name reported when the answer was not generated.
pub const RETRIEVAL_ONLY_MODEL: &str = "retrieval-only";

/// Inbound chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Outbound chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: Message,
    pub citations: Vec<Citation>,
    pub session_id: String,
}

/// Handles to every collaborator the pipeline talks to.
#[derive(Clone)]
pub struct RagServices {
    pub embedder: EmbeddingEngine,
    pub retriever: Arc<dyn CandidateRetriever>,
    pub reranker: Arc<Reranker>,
    pub synthesizer: Arc<Synthesizer>,
    pub citations: CitationBuilder,
    pub sessions: Arc<dyn SessionStore>,
    /// Shortlist size `K` requested from the retriever
    pub candidate_limit: usize,
    /// Lexical weight of the hybrid score
    pub alpha: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Embed,
    Retrieve,
    Rank,
    Rerank,
    Synthesize,
    BuildCitations,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Embed => "embed",
            Stage::Retrieve => "retrieve",
            Stage::Rank => "rank",
            Stage::Rerank => "rerank",
            Stage::Synthesize => "synthesize",
            Stage::BuildCitations => "build_citations",
            Stage::Persist => "persist",
        }
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("stage", name = self.as_str())
    }
}

/// Trim `question` and check it is non-empty and within bounds.
pub fn validate_question(question: &str) -> AppResult<String> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Question must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_QUESTION_CHARS {
        return Err(AppError::Validation(format!(
            "Question must be at most {} characters",
            MAX_QUESTION_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

pub struct Pipeline {
    services: RagServices,
}

impl Pipeline {
    pub fn new(services: RagServices) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &RagServices {
        &self.services
    }

    /// Answer one question and append the exchange to its session.
    ///
    /// A missing session id starts a new session.
    pub async fn answer(&self, request: ChatRequest, cancel: &CancelSignal) -> AppResult<ChatResponse> {
        let started = Instant::now();
        let services = &self.services;

        let question = {
            let _span = Stage::Validate.span().entered();
            validate_question(&request.question)?
        };
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let (query_vector, degraded) = cancel
            .guard(Stage::Embed.as_str(), services.embedder.embed_query(&question))
            .instrument(Stage::Embed.span())
            .await?;
        if degraded {
            tracing::warn!("Answering with a fallback query embedding");
        }

        let candidates = cancel
            .guard(
                Stage::Retrieve.as_str(),
                services
                    .retriever
                    .retrieve(&query_vector, services.candidate_limit, cancel),
            )
            .instrument(Stage::Retrieve.span())
            .await?;
        if candidates.is_empty() {
            tracing::info!(
                backend = services.retriever.backend_name(),
                "Retrieval returned no candidates"
            );
            return Err(AppError::NoCandidates);
        }

        let ranked = {
            let _span = Stage::Rank.span().entered();
            let ranked = rank(&question, candidates, services.alpha);
            tracing::debug!(
                shortlist = ranked.len(),
                top_hybrid = ranked.first().map(|r| r.hybrid_score),
                "Ranked candidates"
            );
            ranked
        };

        let reranked = services
            .reranker
            .rerank(&question, ranked, cancel)
            .instrument(Stage::Rerank.span())
            .await?;

        let synthesis = services
            .synthesizer
            .synthesize(&question, &reranked, cancel)
            .instrument(Stage::Synthesize.span())
            .await?;

        let citations = {
            let _span = Stage::BuildCitations.span().entered();
            services.citations.build(&reranked)
        };

        let metadata = ResponseMetadata {
            model: synthesis
                .model
                .unwrap_or_else(|| RETRIEVAL_ONLY_MODEL.to_string()),
            processing_time: started.elapsed().as_millis() as u64,
            confidence: reranked.first().map(|c| c.relevance()).unwrap_or(0.0),
            persisted: true,
        };

        let user = Message::user(question);
        let mut assistant = Message::assistant(synthesis.content, citations.clone(), metadata);

        let persisted = services
            .sessions
            .append_exchange(&session_id, &user, &assistant)
            .instrument(Stage::Persist.span())
            .await;
        if let Err(e) = persisted {
            tracing::error!(
                error = %e,
                session_id = %session_id,
                "Failed to persist exchange, returning answer unsaved"
            );
            if let Some(metadata) = assistant.metadata.as_mut() {
                metadata.persisted = false;
            }
        }

        tracing::info!(
            session_id = %session_id,
            citations = citations.len(),
            degraded,
            used_generation = synthesis.used_generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answered question"
        );

        Ok(ChatResponse {
            message: assistant,
            citations,
            session_id,
        })
    }

    /// Messages of a session in append order.
    pub async fn history(&self, session_id: &str) -> AppResult<Vec<Message>> {
        self.services.sessions.messages(session_id).await
    }
}
