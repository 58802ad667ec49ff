//! Builds the pipeline's service handles from configuration.

use std::sync::Arc;
use std::time::Duration;

use docent_core::{config::AppConfig, AppError, AppResult};
use docent_llm::create_client;
use docent_prompt::{list_prompts, PromptSet};
use docent_rag::{
    create_provider, CandidateRetriever, CitationBuilder, DistanceMetric, EmbeddingEngine,
    GenerationOptions, PgVectorRetriever, RagServices, Reranker, SqliteCorpus,
    SqliteSessionStore, Synthesizer,
};

/// Connect every collaborator named in `config`.
pub async fn build_services(config: &AppConfig) -> AppResult<RagServices> {
    config.validate()?;

    let embedding_key = AppConfig::resolve_secret(config.embedding.api_key_env.as_deref());
    let provider = create_provider(&config.embedding, embedding_key.as_deref())?;
    let embedder = EmbeddingEngine::new(provider, config.embedding.dimensions);

    let retriever = build_retriever(config).await?;

    let prompts_dir = config.prompts_dir.as_ref().map(|p| config.resolve_path(p));
    if let Some(dir) = prompts_dir.as_deref().filter(|d| d.is_dir()) {
        tracing::debug!("Prompt overrides in {:?}: {:?}", dir, list_prompts(dir)?);
    }
    let prompts = PromptSet::load(prompts_dir.as_deref())?;

    let generation = &config.generation;
    let llm = if generation.enabled() {
        let api_key = AppConfig::resolve_secret(generation.api_key_env.as_deref());
        Some(create_client(
            &generation.provider,
            generation.endpoint.as_deref(),
            api_key.as_deref(),
            Duration::from_secs(generation.timeout_secs),
        )?)
    } else {
        tracing::info!("Generation disabled, answers will quote the top passage");
        None
    };

    let top_n = config.ranking.rerank_top_n;
    let reranker = match &llm {
        Some(client) if generation.rerank => {
            Reranker::new(Some(client.clone()), &generation.model, prompts.rerank, top_n)
        }
        _ => Reranker::passthrough_only(prompts.rerank, top_n),
    };

    let synthesizer = Synthesizer::new(
        llm.map(|client| {
            (
                client,
                GenerationOptions {
                    model: generation.model.clone(),
                    temperature: generation.temperature,
                    max_tokens: generation.max_tokens,
                },
            )
        }),
        prompts.answer,
        config.synthesis.context_snippet_chars,
    );

    let sessions = SqliteSessionStore::open(config.resolve_path(&config.sessions.path))?;

    tracing::info!(
        embedding = %config.embedding.provider,
        retrieval = retriever.backend_name(),
        generation = %generation.provider,
        "Pipeline services ready"
    );

    Ok(RagServices {
        embedder,
        retriever,
        reranker: Arc::new(reranker),
        synthesizer: Arc::new(synthesizer),
        citations: CitationBuilder::new(
            config.citations.base_url.clone(),
            config.citations.excerpt_chars,
        ),
        sessions: Arc::new(sessions),
        candidate_limit: config.retrieval.candidate_limit,
        alpha: config.ranking.alpha,
    })
}

async fn build_retriever(config: &AppConfig) -> AppResult<Arc<dyn CandidateRetriever>> {
    let retrieval = &config.retrieval;
    let metric = DistanceMetric::parse(&retrieval.metric)?;

    match retrieval.backend.to_lowercase().as_str() {
        "pgvector" => {
            let url = retrieval.database_url.as_deref().ok_or_else(|| {
                AppError::Config("pgvector backend requires a database URL".to_string())
            })?;
            let retriever = PgVectorRetriever::connect(
                url,
                retrieval.pool_size,
                &retrieval.chunks_table,
                &retrieval.documents_table,
                metric,
            )
            .await?;
            Ok(Arc::new(retriever))
        }
        "sqlite" => {
            let corpus = SqliteCorpus::new(config.resolve_path(&retrieval.sqlite_path), metric);
            corpus.init()?;
            Ok(Arc::new(corpus))
        }
        other => Err(AppError::Config(format!(
            "Unknown retrieval backend: {}",
            other
        ))),
    }
}
