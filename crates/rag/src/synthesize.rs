//! Grounded answer synthesis.

use std::sync::Arc;

use docent_core::{AppError, AppResult, CancelSignal};
use docent_llm::{LlmClient, LlmRequest};
use docent_prompt::{build_prompt, PromptDefinition};
use serde::Serialize;

use crate::text::snippet;
use crate::types::RerankedCandidate;

/// Answer text plus how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub content: String,
    pub used_generation: bool,
    /// Model that wrote the answer, when one did
    pub model: Option<String>,
}

#[derive(Serialize)]
struct ContextPassage<'a> {
    number: usize,
    title: &'a str,
    source: &'a str,
    heading: Option<&'a str>,
    snippet: String,
}

#[derive(Serialize)]
struct AnswerContext<'a> {
    question: &'a str,
    context: Vec<ContextPassage<'a>>,
}

/// Generation settings used when a model is configured.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct Synthesizer {
    llm: Option<(Arc<dyn LlmClient>, GenerationOptions)>,
    prompt: PromptDefinition,
    snippet_chars: usize,
}

impl Synthesizer {
    pub fn new(
        llm: Option<(Arc<dyn LlmClient>, GenerationOptions)>,
        prompt: PromptDefinition,
        snippet_chars: usize,
    ) -> Self {
        Self {
            llm,
            prompt,
            snippet_chars,
        }
    }

    /// Answer `question` from the final ranked candidates.
    ///
    /// Without a model the top candidate's content is returned verbatim.
    /// Model failures are returned to the caller.
    pub async fn synthesize(
        &self,
        question: &str,
        candidates: &[RerankedCandidate],
        cancel: &CancelSignal,
    ) -> AppResult<Synthesis> {
        let top = candidates.first().ok_or(AppError::NoCandidates)?;

        let Some((llm, options)) = &self.llm else {
            return Ok(Synthesis {
                content: top.chunk().content.clone(),
                used_generation: false,
                model: None,
            });
        };

        let built = build_prompt(&self.prompt, &self.context(question, candidates))?;

        let mut request = LlmRequest::new(built.user, &options.model)
            .with_temperature(options.temperature)
            .with_max_tokens(options.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = cancel.guard("synthesize", llm.complete(&request)).await?;
        let content = response.content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::Llm("Model returned an empty answer".to_string()));
        }

        tracing::debug!(
            model = %response.model,
            completion_tokens = response.usage.completion_tokens,
            "Synthesized answer"
        );

        Ok(Synthesis {
            content,
            used_generation: true,
            model: Some(response.model),
        })
    }

    fn context<'a>(
        &self,
        question: &'a str,
        candidates: &'a [RerankedCandidate],
    ) -> AnswerContext<'a> {
        AnswerContext {
            question,
            context: candidates
                .iter()
                .enumerate()
                .map(|(i, c)| ContextPassage {
                    number: i + 1,
                    title: &c.chunk().title,
                    source: &c.chunk().source,
                    heading: c.chunk().heading.as_deref(),
                    snippet: snippet(&c.chunk().content, self.snippet_chars),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candidate, Chunk, RankedCandidate};
    use docent_llm::{LlmResponse, LlmUsage};
    use docent_prompt::PromptSet;
    use std::sync::Mutex;

    /// Records the prompt and answers with a fixed reply.
    struct RecordingLlm {
        reply: Option<String>,
        seen: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmClient for RecordingLlm {
        fn provider_name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Some(reply) => Ok(LlmResponse {
                    content: reply.clone(),
                    model: "gen-model-v2".to_string(),
                    usage: LlmUsage::new(10, 5),
                }),
                None => Err(AppError::Llm("upstream unavailable".to_string())),
            }
        }
    }

    fn candidate(id: &str, content: &str) -> RerankedCandidate {
        RerankedCandidate::passthrough(RankedCandidate {
            candidate: Candidate {
                chunk: Chunk {
                    id: id.to_string(),
                    document_id: "doc".to_string(),
                    content: content.to_string(),
                    heading: Some("Lexical scope".to_string()),
                    chunk_index: 0,
                    title: "Closures".to_string(),
                    slug: "closures".to_string(),
                    source: "mdn".to_string(),
                },
                distance: 0.1,
            },
            bm25_score: 1.0,
            bm25_norm: 1.0,
            vec_sim: 1.0,
            hybrid_score: 1.0,
        })
    }

    fn options() -> GenerationOptions {
        GenerationOptions {
            model: "gen-model".to_string(),
            temperature: 0.2,
            max_tokens: 300,
        }
    }

    #[tokio::test]
    async fn test_without_model_returns_top_passage() {
        let synthesizer = Synthesizer::new(None, PromptSet::default().answer, 800);
        let candidates = vec![candidate("a", "First passage."), candidate("b", "Second.")];

        let synthesis = synthesizer
            .synthesize("q", &candidates, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(synthesis.content, "First passage.");
        assert!(!synthesis.used_generation);
        assert!(synthesis.model.is_none());
    }

    #[tokio::test]
    async fn test_no_candidates_is_error() {
        let synthesizer = Synthesizer::new(None, PromptSet::default().answer, 800);
        let result = synthesizer
            .synthesize("q", &[], &CancelSignal::never())
            .await;
        assert!(matches!(result, Err(AppError::NoCandidates)));
    }

    #[tokio::test]
    async fn test_prompt_carries_bounded_context() {
        let llm = Arc::new(RecordingLlm {
            reply: Some("  A closure keeps its scope.  ".to_string()),
            seen: Mutex::new(Vec::new()),
        });
        let client: Arc<dyn LlmClient> = llm.clone();
        let synthesizer = Synthesizer::new(
            Some((client, options())),
            PromptSet::default().answer,
            40,
        );
        let long = "closure ".repeat(50);
        let candidates = vec![candidate("a", &long)];

        let synthesis = synthesizer
            .synthesize("What is a closure?", &candidates, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(synthesis.content, "A closure keeps its scope.");
        assert!(synthesis.used_generation);
        assert_eq!(synthesis.model.as_deref(), Some("gen-model-v2"));

        let seen = llm.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.model, "gen-model");
        assert_eq!(request.max_tokens, Some(300));
        assert!(request.prompt.contains("[1] Closures (mdn) > Lexical scope"));
        assert!(request.prompt.contains("What is a closure?"));
        assert!(!request.prompt.contains(&long));
        assert!(request.system.as_deref().unwrap_or("").contains("Never invent"));
    }

    #[tokio::test]
    async fn test_generation_failure_is_fatal() {
        let llm = Arc::new(RecordingLlm {
            reply: None,
            seen: Mutex::new(Vec::new()),
        });
        let client: Arc<dyn LlmClient> = llm;
        let synthesizer = Synthesizer::new(Some((client, options())), PromptSet::default().answer, 800);

        let result = synthesizer
            .synthesize("q", &[candidate("a", "text")], &CancelSignal::never())
            .await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }

    #[tokio::test]
    async fn test_empty_answer_is_error() {
        let llm = Arc::new(RecordingLlm {
            reply: Some("   ".to_string()),
            seen: Mutex::new(Vec::new()),
        });
        let client: Arc<dyn LlmClient> = llm;
        let synthesizer = Synthesizer::new(Some((client, options())), PromptSet::default().answer, 800);

        let result = synthesizer
            .synthesize("q", &[candidate("a", "text")], &CancelSignal::never())
            .await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }
}
