//! Built-in prompts used by the RAG pipeline.
//!
//! Each prompt may be replaced by a `<id>.yml` file in the configured
//! prompts directory.

use std::path::Path;

use crate::loader::load_prompt;
use crate::types::PromptDefinition;
use docent_core::AppResult;

/// Prompt that scores shortlisted passages.
pub const RERANK_PROMPT_ID: &str = "rag.rerank";

/// Prompt that writes the grounded answer.
pub const ANSWER_PROMPT_ID: &str = "rag.answer";

const RERANK_SYSTEM: &str = "You judge how relevant documentation passages are to a question. \
Reply with JSON only.";

const RERANK_TEMPLATE: &str = r#"Question: {{question}}

Passages:
{{#each candidates}}
[{{id}}] {{title}}{{#if heading}} > {{heading}}{{/if}}
{{snippet}}

{{/each}}
Score every passage from 0 (irrelevant) to 1 (answers the question directly).
Respond with only a JSON array such as [{"id": "<passage id>", "score": 0.5}]."#;

const ANSWER_SYSTEM: &str = "You are Docent, an assistant that answers questions about a documentation corpus. \
Prefer the provided context when answering. If the context is insufficient, you may use general knowledge, \
and say that the sources do not cover it. Never invent source URLs or quotes.";

const ANSWER_TEMPLATE: &str = r#"Context:
{{#each context}}
[{{number}}] {{title}} ({{source}}){{#if heading}} > {{heading}}{{/if}}
{{snippet}}

{{/each}}
Question: {{question}}

Answer:"#;

/// The prompts the pipeline renders on every request.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub rerank: PromptDefinition,
    pub answer: PromptDefinition,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            rerank: PromptDefinition {
                id: RERANK_PROMPT_ID.to_string(),
                title: "Re-rank shortlisted passages".to_string(),
                system: Some(RERANK_SYSTEM.to_string()),
                template: RERANK_TEMPLATE.to_string(),
            },
            answer: PromptDefinition {
                id: ANSWER_PROMPT_ID.to_string(),
                title: "Grounded answer".to_string(),
                system: Some(ANSWER_SYSTEM.to_string()),
                template: ANSWER_TEMPLATE.to_string(),
            },
        }
    }
}

impl PromptSet {
    /// Built-in prompts, replaced by any override found in `prompts_dir`.
    pub fn load(prompts_dir: Option<&Path>) -> AppResult<Self> {
        let mut set = Self::default();
        let Some(dir) = prompts_dir else {
            return Ok(set);
        };

        if dir.join(format!("{}.yml", RERANK_PROMPT_ID)).exists() {
            set.rerank = load_prompt(dir, RERANK_PROMPT_ID)?;
        }
        if dir.join(format!("{}.yml", ANSWER_PROMPT_ID)).exists() {
            set.answer = load_prompt(dir, ANSWER_PROMPT_ID)?;
        }

        Ok(set)
    }
}
