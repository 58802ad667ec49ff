//! RAG pipeline data model.
//!
//! Candidates grow richer as they move through the pipeline:
//! `Candidate` (retrieval) → `RankedCandidate` (hybrid ranking) →
//! `RerankedCandidate` (re-ranking). Earlier scores are never overwritten.

use serde::{Deserialize, Serialize};

/// A bounded slice of a source document, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Unique chunk identifier
    pub id: String,

    /// Parent document identifier
    pub document_id: String,

    /// Chunk text
    pub content: String,

    /// Section heading the chunk sits under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,

    /// Position of the chunk within its document
    pub chunk_index: i32,

    /// Parent document title
    pub title: String,

    /// Parent document slug, used to build canonical URLs
    pub slug: String,

    /// Parent document source (e.g. the corpus it was imported from)
    pub source: String,
}

/// Parent document metadata stored alongside chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub source: String,
}

/// A chunk returned by the retriever with its distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(flatten)]
    pub chunk: Chunk,

    /// Distance to the query embedding (>= 0, smaller is closer)
    pub distance: f64,
}

/// A candidate scored by the hybrid ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,

    /// Raw Okapi BM25 score over the shortlist
    pub bm25_score: f64,

    /// Min-max normalized BM25 score in [0, 1]
    pub bm25_norm: f64,

    /// `1 - normalized distance`, in [0, 1]
    pub vec_sim: f64,

    /// `alpha * bm25_norm + (1 - alpha) * vec_sim`
    pub hybrid_score: f64,
}

impl RankedCandidate {
    pub fn chunk(&self) -> &Chunk {
        &self.candidate.chunk
    }
}

/// A ranked candidate after the re-ranking stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankedCandidate {
    #[serde(flatten)]
    pub ranked: RankedCandidate,

    /// Model-assigned relevance in [0, 1]; equals the hybrid score on pass-through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

impl RerankedCandidate {
    /// Carry a ranked candidate through unchanged.
    pub fn passthrough(ranked: RankedCandidate) -> Self {
        let score = ranked.hybrid_score;
        Self {
            ranked,
            rerank_score: Some(score),
        }
    }

    /// Score used for final ordering and citation relevance.
    pub fn relevance(&self) -> f64 {
        self.rerank_score.unwrap_or(self.ranked.hybrid_score)
    }

    pub fn chunk(&self) -> &Chunk {
        self.ranked.chunk()
    }
}

/// How directly a citation supports the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// The cited passage was given to the model verbatim
    Direct,
}

impl TrustLevel {
    pub const ALL: [TrustLevel; 1] = [TrustLevel::Direct];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Direct => "direct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == s)
    }
}

/// A structured link from an answer back to a supporting chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub id: String,
    pub url: String,
    pub article_title: String,
    pub excerpt: String,
    pub trust_level: TrustLevel,
    pub relevance_score: f64,
}
