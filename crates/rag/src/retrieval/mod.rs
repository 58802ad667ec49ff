//! Candidate retrieval from a vector-capable datastore.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PgVectorRetriever;
pub use self::sqlite::SqliteCorpus;

use crate::types::Candidate;
use docent_core::{AppError, AppResult, CancelSignal};

/// Nearest-neighbor lookup returning candidates closest first.
#[async_trait::async_trait]
pub trait CandidateRetriever: Send + Sync {
    /// Backend name for logs (e.g. "pgvector", "sqlite")
    fn backend_name(&self) -> &str;

    /// Return up to `limit` candidates ordered ascending by distance.
    ///
    /// An empty result is not an error; the pipeline turns it into
    /// `NoCandidates`.
    async fn retrieve(
        &self,
        query: &[f32],
        limit: usize,
        cancel: &CancelSignal,
    ) -> AppResult<Vec<Candidate>>;
}

/// Distance between a query and a stored embedding. Both metrics are
/// non-negative and grow as vectors drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// `1 - cosine similarity`
    #[default]
    Cosine,
    /// Euclidean distance
    L2,
}

impl DistanceMetric {
    pub fn parse(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" | "euclidean" => Ok(Self::L2),
            other => Err(AppError::Config(format!(
                "Unknown distance metric: {}. Supported: cosine, l2",
                other
            ))),
        }
    }

    /// pgvector operator implementing the metric.
    pub fn pg_operator(&self) -> &'static str {
        match self {
            Self::Cosine => "<=>",
            Self::L2 => "<->",
        }
    }

    /// Compute the distance in process.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            Self::Cosine => (1.0 - cosine_similarity(a, b)).max(0.0),
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = (*x as f64) - (*y as f64);
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
        }
    }
}

/// Cosine similarity; zero vectors are treated as orthogonal.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
