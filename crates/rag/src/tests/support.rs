//! In-process stand-ins for the services the pipeline talks to.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use docent_core::{AppError, AppResult, CancelSignal};
use docent_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use docent_prompt::PromptSet;

use crate::citations::CitationBuilder;
use crate::embeddings::{EmbedOutcome, EmbeddingEngine, EmbeddingProvider};
use crate::pipeline::{Pipeline, RagServices};
use crate::rerank::Reranker;
use crate::retrieval::CandidateRetriever;
use crate::session::{Message, SessionStore};
use crate::synthesize::{GenerationOptions, Synthesizer};
use crate::types::{Candidate, Chunk};

pub const DIMENSIONS: usize = 4;

/// Embedding service with one canned behaviour.
#[derive(Debug)]
pub enum EmbedScript {
    /// Answer every text with this (unfitted) vector
    Vector(Vec<f32>),
    Throttle(u16),
    Fail,
}

#[derive(Debug)]
pub struct FakeEmbedder {
    script: EmbedScript,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(script: EmbedScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn provider_name(&self) -> &str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-embed"
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<EmbedOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            EmbedScript::Vector(v) => Ok(EmbedOutcome::Vectors(vec![v.clone(); texts.len()])),
            EmbedScript::Throttle(status) => Ok(EmbedOutcome::Throttled {
                status: *status,
                detail: "quota exceeded".to_string(),
            }),
            EmbedScript::Fail => Err(AppError::Embedding("connection refused".to_string())),
        }
    }
}

/// Retriever that returns a fixed shortlist and records the query vectors.
pub struct FakeRetriever {
    candidates: Vec<Candidate>,
    stuck: bool,
    pub queries: Mutex<Vec<Vec<f32>>>,
}

impl FakeRetriever {
    pub fn new(candidates: Vec<Candidate>) -> Arc<Self> {
        Arc::new(Self {
            candidates,
            stuck: false,
            queries: Mutex::new(Vec::new()),
        })
    }

    /// A retriever whose query never completes.
    pub fn stuck() -> Arc<Self> {
        Arc::new(Self {
            candidates: Vec::new(),
            stuck: true,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl CandidateRetriever for FakeRetriever {
    fn backend_name(&self) -> &str {
        "fake"
    }

    async fn retrieve(
        &self,
        query: &[f32],
        limit: usize,
        _cancel: &CancelSignal,
    ) -> AppResult<Vec<Candidate>> {
        self.queries.lock().unwrap().push(query.to_vec());
        if self.stuck {
            std::future::pending::<()>().await;
        }
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }
}

/// Generative model answering from a queue of scripted replies.
pub struct FakeLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    stuck: bool,
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl FakeLlm {
    pub fn scripted<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<S, S>>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(Into::into).map_err(Into::into))
                    .collect(),
            ),
            stuck: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn stuck() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            stuck: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LlmClient for FakeLlm {
    fn provider_name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if self.stuck {
            std::future::pending::<()>().await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted reply".to_string()));
        match reply {
            Ok(content) => Ok(LlmResponse {
                content,
                model: format!("{}-served", request.model),
                usage: LlmUsage::new(20, 10),
            }),
            Err(msg) => Err(AppError::Llm(msg)),
        }
    }
}

/// Session store whose writes always fail.
pub struct FailingSessionStore;

#[async_trait::async_trait]
impl SessionStore for FailingSessionStore {
    async fn append_exchange(&self, _: &str, _: &Message, _: &Message) -> AppResult<()> {
        Err(AppError::Persistence("disk I/O error".to_string()))
    }

    async fn messages(&self, _: &str) -> AppResult<Vec<Message>> {
        Err(AppError::Persistence("disk I/O error".to_string()))
    }
}

pub fn candidate(id: &str, document_id: &str, title: &str, content: &str, distance: f64) -> Candidate {
    Candidate {
        chunk: Chunk {
            id: id.to_string(),
            document_id: document_id.to_string(),
            content: content.to_string(),
            heading: None,
            chunk_index: 0,
            title: title.to_string(),
            slug: title.to_lowercase().replace(' ', "-"),
            source: "mdn".to_string(),
        },
        distance,
    }
}

/// Grid, closure and flexbox passages; the closure passage is slightly
/// farther than the grid passage in vector space.
pub fn closure_shortlist() -> Vec<Candidate> {
    vec![
        candidate(
            "grid",
            "d-grid",
            "CSS Grid",
            "Grid lays out elements in rows and columns.",
            0.40,
        ),
        candidate(
            "closure",
            "d-closure",
            "Closures",
            "A closure is a function bundled with references to its surrounding state.",
            0.42,
        ),
        candidate(
            "flex",
            "d-flex",
            "Flexbox",
            "Flex items grow along the main axis.",
            0.90,
        ),
    ]
}

/// Assemble services around the given fakes.
pub fn services(
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Arc<dyn CandidateRetriever>,
    llm: Option<Arc<dyn LlmClient>>,
    sessions: Arc<dyn SessionStore>,
    alpha: f64,
) -> RagServices {
    let prompts = PromptSet::default();
    let reranker = Reranker::new(llm.clone(), "rerank-model", prompts.rerank, 5);
    let generation = llm.map(|client| {
        (
            client,
            GenerationOptions {
                model: "answer-model".to_string(),
                temperature: 0.2,
                max_tokens: 400,
            },
        )
    });

    RagServices {
        embedder: EmbeddingEngine::new(embedder, DIMENSIONS),
        retriever,
        reranker: Arc::new(reranker),
        synthesizer: Arc::new(Synthesizer::new(generation, prompts.answer, 800)),
        citations: CitationBuilder::new("https://docs.example.com/", 280),
        sessions,
        candidate_limit: 20,
        alpha,
    }
}

pub fn pipeline(
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Arc<dyn CandidateRetriever>,
    llm: Option<Arc<dyn LlmClient>>,
    sessions: Arc<dyn SessionStore>,
) -> Pipeline {
    Pipeline::new(services(embedder, retriever, llm, sessions, 0.6))
}

pub fn model(llm: &Arc<FakeLlm>) -> Option<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = llm.clone();
    Some(client)
}
