//! Hybrid lexical + semantic ranking.
//!
//! BM25 is computed over the retrieved shortlist only: document frequency
//! and average length come from the candidates themselves, so scores are
//! comparable within one request and nowhere else.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::types::{Candidate, RankedCandidate};

/// BM25 term-frequency saturation.
pub const BM25_K1: f64 = 1.5;

/// BM25 length normalization.
pub const BM25_B: f64 = 0.75;

/// Lower-case, split on anything that is not alphanumeric, drop empties.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Min-max normalize into [0, 1]. Constant input maps to 0.5 everywhere.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if !range.is_finite() || range <= f64::EPSILON {
        return vec![0.5; values.len()];
    }

    values.iter().map(|v| (v - min) / range).collect()
}

/// Okapi BM25 score of `query` against each document in `documents`.
pub fn bm25_scores(query: &str, documents: &[String]) -> Vec<f64> {
    let docs: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
    let n = docs.len() as f64;
    if docs.is_empty() {
        return Vec::new();
    }

    let avgdl = docs.iter().map(|d| d.len()).sum::<usize>() as f64 / n;

    let mut seen = HashSet::new();
    let terms: Vec<String> = tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect();

    let term_freqs: Vec<HashMap<&str, usize>> = docs
        .iter()
        .map(|tokens| {
            let mut tf = HashMap::new();
            for token in tokens {
                *tf.entry(token.as_str()).or_insert(0) += 1;
            }
            tf
        })
        .collect();

    let idf: Vec<f64> = terms
        .iter()
        .map(|term| {
            let df = term_freqs
                .iter()
                .filter(|tf| tf.contains_key(term.as_str()))
                .count() as f64;
            (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
        })
        .collect();

    docs.iter()
        .zip(&term_freqs)
        .map(|(tokens, tf)| {
            let dl = tokens.len() as f64;
            let length_norm = if avgdl > 0.0 { dl / avgdl } else { 1.0 };
            terms
                .iter()
                .zip(&idf)
                .filter_map(|(term, idf)| {
                    let f = *tf.get(term.as_str())? as f64;
                    let denom = f + BM25_K1 * (1.0 - BM25_B + BM25_B * length_norm);
                    Some(idf * f * (BM25_K1 + 1.0) / denom)
                })
                .sum()
        })
        .collect()
}

/// Text BM25 sees for a candidate: title, heading and content.
fn ranking_text(candidate: &Candidate) -> String {
    let chunk = &candidate.chunk;
    match &chunk.heading {
        Some(heading) => format!("{} {} {}", chunk.title, heading, chunk.content),
        None => format!("{} {}", chunk.title, chunk.content),
    }
}

/// Score and order candidates by `alpha * bm25_norm + (1 - alpha) * vec_sim`.
///
/// The result is a permutation of the input sorted non-increasing by hybrid
/// score; ties keep retrieval order.
pub fn rank(query: &str, candidates: Vec<Candidate>, alpha: f64) -> Vec<RankedCandidate> {
    let texts: Vec<String> = candidates.iter().map(ranking_text).collect();
    let bm25 = bm25_scores(query, &texts);
    let bm25_norm = normalize(&bm25);

    let distances: Vec<f64> = candidates.iter().map(|c| c.distance).collect();
    let distance_norm = normalize(&distances);

    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, candidate)| {
            let vec_sim = 1.0 - distance_norm[i];
            RankedCandidate {
                candidate,
                bm25_score: bm25[i],
                bm25_norm: bm25_norm[i],
                vec_sim,
                hybrid_score: alpha * bm25_norm[i] + (1.0 - alpha) * vec_sim,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(Ordering::Equal)
    });

    ranked
}
