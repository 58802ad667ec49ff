//! Citation records for the final ranked list.

use crate::text::snippet;
use crate::types::{Citation, RerankedCandidate, TrustLevel};

/// Builds one citation per candidate, in rank order.
///
/// Chunks from the same document each get their own citation.
#[derive(Debug, Clone)]
pub struct CitationBuilder {
    base_url: String,
    excerpt_chars: usize,
}

impl CitationBuilder {
    pub fn new(base_url: impl Into<String>, excerpt_chars: usize) -> Self {
        Self {
            base_url: base_url.into(),
            excerpt_chars,
        }
    }

    /// `<base_url>/<slug>` with exactly one slash at the join.
    pub fn canonical_url(&self, slug: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            slug.trim_start_matches('/')
        )
    }

    pub fn build(&self, candidates: &[RerankedCandidate]) -> Vec<Citation> {
        candidates
            .iter()
            .map(|c| Citation {
                id: uuid::Uuid::new_v4().to_string(),
                url: self.canonical_url(&c.chunk().slug),
                article_title: c.chunk().title.clone(),
                excerpt: snippet(&c.chunk().content, self.excerpt_chars),
                trust_level: TrustLevel::Direct,
                relevance_score: c.relevance(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candidate, Chunk, RankedCandidate};
    use std::collections::HashSet;

    fn candidate(id: &str, document_id: &str, slug: &str, rerank: Option<f64>) -> RerankedCandidate {
        RerankedCandidate {
            ranked: RankedCandidate {
                candidate: Candidate {
                    chunk: Chunk {
                        id: id.to_string(),
                        document_id: document_id.to_string(),
                        content: format!("Passage   {}\n\nwith   spacing", id),
                        heading: None,
                        chunk_index: 0,
                        title: format!("Doc {}", document_id),
                        slug: slug.to_string(),
                        source: "docs".to_string(),
                    },
                    distance: 0.3,
                },
                bm25_score: 0.0,
                bm25_norm: 0.5,
                vec_sim: 0.5,
                hybrid_score: 0.6,
            },
            rerank_score: rerank,
        }
    }

    #[test]
    fn test_canonical_url_joins_once() {
        let builder = CitationBuilder::new("https://docs.example.com/articles/", 280);
        assert_eq!(
            builder.canonical_url("/closures"),
            "https://docs.example.com/articles/closures"
        );
        assert_eq!(
            CitationBuilder::new("/docs", 280).canonical_url("grid"),
            "/docs/grid"
        );
    }

    #[test]
    fn test_build_preserves_order_and_scores() {
        let builder = CitationBuilder::new("/docs", 280);
        let citations = builder.build(&[
            candidate("c1", "d1", "closures", Some(0.9)),
            candidate("c2", "d2", "grid", None),
        ]);

        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].url, "/docs/closures");
        assert_eq!(citations[0].relevance_score, 0.9);
        assert_eq!(citations[1].relevance_score, 0.6);
        assert_eq!(citations[0].article_title, "Doc d1");
        assert_eq!(citations[0].excerpt, "Passage c1 with spacing");
        assert_eq!(citations[0].trust_level, TrustLevel::Direct);
    }

    #[test]
    fn test_no_dedup_for_chunks_of_one_document() {
        let builder = CitationBuilder::new("/docs", 280);
        let citations = builder.build(&[
            candidate("c1", "d1", "closures", Some(0.8)),
            candidate("c2", "d1", "closures", Some(0.7)),
        ]);

        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].url, citations[1].url);
        let ids: HashSet<_> = citations.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let builder = CitationBuilder::new("/docs", 10);
        let citations = builder.build(&[candidate("c1", "d1", "s", None)]);
        assert!(citations[0].excerpt.chars().count() <= 10);
        assert!(citations[0].excerpt.ends_with('…'));
    }
}
