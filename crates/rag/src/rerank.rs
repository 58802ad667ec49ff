//! Generative re-ranking of the hybrid shortlist.
//!
//! The model scores each shortlisted passage; anything that goes wrong here
//! degrades to the hybrid order instead of failing the request. Only
//! cancellation propagates.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use docent_core::{AppError, AppResult, CancelSignal};
use docent_llm::{LlmClient, LlmRequest};
use docent_prompt::{build_prompt, PromptDefinition};
use serde::Serialize;
use serde_json::Value;

use crate::text::snippet;
use crate::types::{RankedCandidate, RerankedCandidate};

const RERANK_SNIPPET_CHARS: usize = 500;

#[derive(Serialize)]
struct RerankPassage<'a> {
    id: &'a str,
    title: &'a str,
    heading: Option<&'a str>,
    snippet: String,
}

#[derive(Serialize)]
struct RerankContext<'a> {
    question: &'a str,
    candidates: Vec<RerankPassage<'a>>,
}

/// Model-backed re-ranker; without a model it passes candidates through.
pub struct Reranker {
    llm: Option<Arc<dyn LlmClient>>,
    model: String,
    prompt: PromptDefinition,
    top_n: usize,
}

impl Reranker {
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        model: impl Into<String>,
        prompt: PromptDefinition,
        top_n: usize,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            prompt,
            top_n,
        }
    }

    /// Re-rank without a model: every candidate keeps its hybrid score.
    pub fn passthrough_only(prompt: PromptDefinition, top_n: usize) -> Self {
        Self::new(None, String::new(), prompt, top_n)
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Re-rank the top-N of `ranked`. Every returned candidate has a
    /// `rerank_score`.
    pub async fn rerank(
        &self,
        question: &str,
        mut ranked: Vec<RankedCandidate>,
        cancel: &CancelSignal,
    ) -> AppResult<Vec<RerankedCandidate>> {
        ranked.truncate(self.top_n);

        let Some(llm) = &self.llm else {
            return Ok(passthrough(ranked));
        };
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let reply = match self.ask_model(llm.as_ref(), question, &ranked, cancel).await {
            Ok(reply) => reply,
            Err(AppError::Cancelled(msg)) => return Err(AppError::Cancelled(msg)),
            Err(e) => {
                tracing::warn!(error = %e, "Re-rank call failed, keeping hybrid order");
                return Ok(passthrough(ranked));
            }
        };

        let scores = {
            let shortlist_ids: HashSet<&str> =
                ranked.iter().map(|r| r.chunk().id.as_str()).collect();
            extract_scores(&reply, |id| shortlist_ids.contains(id))
        };
        let Some(scores) = scores else {
            tracing::warn!("Re-rank reply scored none of the shortlist, keeping hybrid order");
            return Ok(passthrough(ranked));
        };

        tracing::debug!(usable = scores.len(), shortlist = ranked.len(), "Applied re-rank scores");

        let mut reranked: Vec<RerankedCandidate> = ranked
            .into_iter()
            .map(|r| {
                let score = scores
                    .get(&r.chunk().id)
                    .copied()
                    .unwrap_or(r.hybrid_score);
                RerankedCandidate {
                    ranked: r,
                    rerank_score: Some(score),
                }
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.relevance()
                .partial_cmp(&a.relevance())
                .unwrap_or(Ordering::Equal)
        });

        Ok(reranked)
    }

    async fn ask_model(
        &self,
        llm: &dyn LlmClient,
        question: &str,
        ranked: &[RankedCandidate],
        cancel: &CancelSignal,
    ) -> AppResult<String> {
        let context = RerankContext {
            question,
            candidates: ranked
                .iter()
                .map(|r| RerankPassage {
                    id: &r.chunk().id,
                    title: &r.chunk().title,
                    heading: r.chunk().heading.as_deref(),
                    snippet: snippet(&r.chunk().content, RERANK_SNIPPET_CHARS),
                })
                .collect(),
        };
        let built = build_prompt(&self.prompt, &context)?;

        let mut request = LlmRequest::new(built.user, &self.model).with_temperature(0.0);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = cancel.guard("rerank", llm.complete(&request)).await?;
        Ok(response.content)
    }
}

fn passthrough(ranked: Vec<RankedCandidate>) -> Vec<RerankedCandidate> {
    ranked.into_iter().map(RerankedCandidate::passthrough).collect()
}

/// Scores from the first JSON array in `text` that scores at least one id
/// accepted by `known`. Arrays without usable entries, such as a passage
/// label like `[2]` echoed in prose, are skipped.
pub fn extract_scores(text: &str, known: impl Fn(&str) -> bool) -> Option<HashMap<String, f64>> {
    json_arrays(text)
        .map(|items| {
            let mut scores = parse_scores(&items);
            scores.retain(|id, _| known(id));
            scores
        })
        .find(|scores| !scores.is_empty())
}

/// Every balanced `[...]` in `text` that parses as a JSON array, in order.
///
/// Brackets inside JSON strings are ignored while balancing. When a balanced
/// span fails to parse, the search resumes at the next `[`.
pub fn json_arrays(text: &str) -> impl Iterator<Item = Vec<Value>> + '_ {
    let bytes = text.as_bytes();
    let mut start = 0;

    std::iter::from_fn(move || {
        while let Some(offset) = text[start..].find('[') {
            let open = start + offset;
            start = open + 1;
            if let Some(close) = balanced_end(bytes, open) {
                if let Ok(items) = serde_json::from_str::<Vec<Value>>(&text[open..=close]) {
                    return Some(items);
                }
            }
        }
        None
    })
}

/// Index of the `]` closing the `[` at `open`, if any.
fn balanced_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Map `{id, score}` entries to clamped scores. Ids may be strings or
/// numbers; entries without a finite numeric score are skipped.
fn parse_scores(items: &[Value]) -> HashMap<String, f64> {
    let mut scores = HashMap::new();

    for item in items {
        let id = match item.get("id") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        let score = match item.get("score") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        if let Some(score) = score.filter(|s| s.is_finite()) {
            scores.insert(id, score.clamp(0.0, 1.0));
        }
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candidate, Chunk};
    use docent_llm::{LlmResponse, LlmUsage};
    use docent_prompt::PromptSet;
    use serde_json::json;

    struct ScriptedLlm {
        reply: AppResult<String>,
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedLlm {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            match &self.reply {
                Ok(content) => Ok(LlmResponse {
                    content: content.clone(),
                    model: request.model.clone(),
                    usage: LlmUsage::default(),
                }),
                Err(e) => Err(AppError::Llm(e.to_string())),
            }
        }
    }

    struct StuckLlm;

    #[async_trait::async_trait]
    impl LlmClient for StuckLlm {
        fn provider_name(&self) -> &str {
            "stuck"
        }

        async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
            std::future::pending().await
        }
    }

    fn ranked(id: &str, hybrid: f64) -> RankedCandidate {
        RankedCandidate {
            candidate: Candidate {
                chunk: Chunk {
                    id: id.to_string(),
                    document_id: "doc".to_string(),
                    content: format!("content of {}", id),
                    heading: None,
                    chunk_index: 0,
                    title: format!("Title {}", id),
                    slug: id.to_string(),
                    source: "docs".to_string(),
                },
                distance: 0.2,
            },
            bm25_score: 0.0,
            bm25_norm: 0.5,
            vec_sim: 0.5,
            hybrid_score: hybrid,
        }
    }

    fn shortlist() -> Vec<RankedCandidate> {
        vec![ranked("a", 0.9), ranked("b", 0.7), ranked("c", 0.5)]
    }

    fn reranker_with(reply: AppResult<String>, top_n: usize) -> Reranker {
        Reranker::new(
            Some(Arc::new(ScriptedLlm { reply })),
            "test-model",
            PromptSet::default().rerank,
            top_n,
        )
    }

    fn ids(list: &[RerankedCandidate]) -> Vec<&str> {
        list.iter().map(|r| r.chunk().id.as_str()).collect()
    }

    #[test]
    fn test_extract_plain_array() {
        let items = json_arrays(r#"[{"id": "a", "score": 0.9}]"#).next().unwrap();
        assert_eq!(items, vec![json!({"id": "a", "score": 0.9})]);
    }

    #[test]
    fn test_extract_array_from_prose() {
        let reply = "Sure! Here are the scores:\n```json\n[{\"id\": \"b\", \"score\": 1}]\n```\nDone.";
        let items = json_arrays(reply).next().unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_extract_ignores_brackets_in_strings() {
        let reply = r#"[{"id": "a]", "score": 0.2}, {"id": "[b", "score": 0.4}]"#;
        let items = json_arrays(reply).next().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["id"], "[b");
    }

    #[test]
    fn test_extract_skips_unparseable_span() {
        let reply = "Ranking [best first]: [{\"id\": \"a\", \"score\": 0.3}]";
        let items = json_arrays(reply).next().unwrap();
        assert_eq!(items[0]["id"], "a");
    }

    #[test]
    fn test_extract_none_for_garbage() {
        assert!(json_arrays("no array here").next().is_none());
        assert!(json_arrays("[unterminated").next().is_none());
        assert!(json_arrays("]][[").next().is_none());
    }

    #[test]
    fn test_scores_skip_echoed_passage_label() {
        let reply = r#"Passage [2] answers it best. [{"id":"2","score":0.9},{"id":"1","score":0.1}]"#;
        let scores = extract_scores(reply, |id| id == "1" || id == "2").unwrap();
        assert_eq!(scores.get("2"), Some(&0.9));
        assert_eq!(scores.get("1"), Some(&0.1));
    }

    #[test]
    fn test_scores_skip_arrays_for_unknown_ids() {
        let reply = r#"Example: [{"id":"x","score":1}] Answer: [{"id":"a","score":0.4}]"#;
        let scores = extract_scores(reply, |id| id == "a").unwrap();
        assert_eq!(scores.len(), 1);
        assert!(extract_scores("[1, 2, 3]", |_| true).is_none());
    }

    #[test]
    fn test_parse_scores_clamps_and_filters() {
        let items = vec![
            json!({"id": "a", "score": 1.7}),
            json!({"id": "b", "score": -0.2}),
            json!({"id": 7, "score": "0.25"}),
            json!({"id": "c", "score": "high"}),
            json!({"id": "d"}),
            json!({"score": 0.5}),
        ];
        let scores = parse_scores(&items);
        assert_eq!(scores.get("a"), Some(&1.0));
        assert_eq!(scores.get("b"), Some(&0.0));
        assert_eq!(scores.get("7"), Some(&0.25));
        assert!(!scores.contains_key("c"));
        assert!(!scores.contains_key("d"));
        assert_eq!(scores.len(), 3);
    }

    #[tokio::test]
    async fn test_no_model_passes_through() {
        let reranker = Reranker::passthrough_only(PromptSet::default().rerank, 2);
        let result = reranker
            .rerank("q", shortlist(), &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(ids(&result), vec!["a", "b"]);
        assert!(result
            .iter()
            .all(|r| r.rerank_score == Some(r.ranked.hybrid_score)));
    }

    #[tokio::test]
    async fn test_scores_reorder_shortlist() {
        let reply = r#"[{"id": "c", "score": 0.95}, {"id": "a", "score": 0.1}]"#;
        let reranker = reranker_with(Ok(reply.to_string()), 5);
        let result = reranker
            .rerank("q", shortlist(), &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(ids(&result), vec!["c", "b", "a"]);
        // "b" was not scored and keeps its hybrid score
        assert_eq!(result[1].rerank_score, Some(0.7));
        assert_eq!(result[2].ranked.hybrid_score, 0.9);
        assert_eq!(result[2].rerank_score, Some(0.1));
    }

    #[tokio::test]
    async fn test_unparseable_reply_passes_through() {
        let reranker = reranker_with(Ok("I think passage a is best.".to_string()), 5);
        let result = reranker
            .rerank("q", shortlist(), &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(ids(&result), vec!["a", "b", "c"]);
        assert!(result
            .iter()
            .all(|r| r.rerank_score == Some(r.ranked.hybrid_score)));
    }

    #[tokio::test]
    async fn test_numeric_ids_survive_label_echo() {
        let shortlist = vec![ranked("1", 0.8), ranked("2", 0.6)];
        let reply = r#"Passage [2] answers it best. [{"id":"2","score":0.9},{"id":"1","score":0.1}]"#;
        let reranker = reranker_with(Ok(reply.to_string()), 5);
        let result = reranker
            .rerank("q", shortlist, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(ids(&result), vec!["2", "1"]);
        assert_eq!(result[0].rerank_score, Some(0.9));
    }

    #[tokio::test]
    async fn test_unknown_ids_pass_through() {
        let reply = r#"[{"id": "zzz", "score": 1.0}]"#;
        let reranker = reranker_with(Ok(reply.to_string()), 5);
        let result = reranker
            .rerank("q", shortlist(), &CancelSignal::never())
            .await
            .unwrap();

        assert!(result
            .iter()
            .all(|r| r.rerank_score == Some(r.ranked.hybrid_score)));
    }

    #[tokio::test]
    async fn test_model_failure_passes_through() {
        let reranker = reranker_with(Err(AppError::Llm("503".to_string())), 5);
        let result = reranker
            .rerank("q", shortlist(), &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(ids(&result), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let reranker = Reranker::new(
            Some(Arc::new(StuckLlm)),
            "m",
            PromptSet::default().rerank,
            5,
        );
        let (handle, signal) = docent_core::cancel_pair(None);
        handle.cancel();

        let result = reranker.rerank("q", shortlist(), &signal).await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
    }
}
