//! Retrieval-augmented question answering.
//!
//! Embeds a question, retrieves a shortlist from a vector datastore, ranks it
//! with a BM25 + vector hybrid, optionally re-ranks it with a generative
//! model, synthesizes a grounded answer and builds citations for it.

pub mod citations;
pub mod embeddings;
pub mod pipeline;
pub mod rank;
pub mod rerank;
pub mod retrieval;
pub mod session;
pub mod synthesize;
pub mod text;
pub mod types;

#[cfg(test)]
mod tests;

pub use citations::CitationBuilder;
pub use embeddings::{create_provider, EmbedOutcome, EmbeddingEngine, EmbeddingProvider, Embeddings};
pub use pipeline::{ChatRequest, ChatResponse, Pipeline, RagServices, Stage};
pub use rerank::Reranker;
pub use retrieval::{CandidateRetriever, DistanceMetric, PgVectorRetriever, SqliteCorpus};
pub use session::{
    InMemorySessionStore, Message, ResponseMetadata, Role, SessionStore, SqliteSessionStore,
};
pub use synthesize::{GenerationOptions, Synthesis, Synthesizer};
pub use types::{Candidate, Chunk, Citation, Document, RankedCandidate, RerankedCandidate, TrustLevel};
