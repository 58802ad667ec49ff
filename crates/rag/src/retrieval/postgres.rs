//! Postgres + pgvector retriever.
//!
//! Connections come from a shared `PgPool` and are checked out per request.
//! The pooled connection goes back to the pool when the request's scope
//! ends, including when the request future is dropped mid-query.

use std::time::Duration;

use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, instrument};

use super::{CandidateRetriever, DistanceMetric};
use crate::types::{Candidate, Chunk};
use docent_core::{AppError, AppResult, CancelSignal};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    id: String,
    document_id: String,
    content: String,
    heading: Option<String>,
    chunk_index: i32,
    title: String,
    slug: String,
    source: String,
    distance: f64,
}

impl From<CandidateRow> for Candidate {
    fn from(row: CandidateRow) -> Self {
        Candidate {
            chunk: Chunk {
                id: row.id,
                document_id: row.document_id,
                content: row.content,
                heading: row.heading,
                chunk_index: row.chunk_index,
                title: row.title,
                slug: row.slug,
                source: row.source,
            },
            distance: row.distance.max(0.0),
        }
    }
}

/// Retriever over a pgvector `chunks` table joined to `documents`.
#[derive(Debug, Clone)]
pub struct PgVectorRetriever {
    pool: PgPool,
    query_sql: String,
    metric: DistanceMetric,
}

impl PgVectorRetriever {
    /// Open a pool of at most `pool_size` connections.
    pub async fn connect(
        database_url: &str,
        pool_size: u32,
        chunks_table: &str,
        documents_table: &str,
        metric: DistanceMetric,
    ) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Datastore(format!("Failed to connect to Postgres: {}", e)))?;

        Ok(Self::from_pool(pool, chunks_table, documents_table, metric))
    }

    /// Wrap an existing pool.
    pub fn from_pool(
        pool: PgPool,
        chunks_table: &str,
        documents_table: &str,
        metric: DistanceMetric,
    ) -> Self {
        Self {
            pool,
            query_sql: select_sql(chunks_table, documents_table, metric),
            metric,
        }
    }
}

#[async_trait::async_trait]
impl CandidateRetriever for PgVectorRetriever {
    fn backend_name(&self) -> &str {
        "pgvector"
    }

    #[instrument(skip(self, query, _cancel), fields(backend = "pgvector", metric = ?self.metric))]
    async fn retrieve(
        &self,
        query: &[f32],
        limit: usize,
        _cancel: &CancelSignal,
    ) -> AppResult<Vec<Candidate>> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            AppError::Datastore(format!("Failed to acquire datastore connection: {}", e))
        })?;

        let rows = sqlx::query_as::<_, CandidateRow>(&self.query_sql)
            .bind(Vector::from(query.to_vec()))
            .bind(limit as i64)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AppError::Datastore(format!("Nearest-neighbor query failed: {}", e)))?;

        debug!("Retrieved {} candidates (requested {})", rows.len(), limit);

        Ok(rows.into_iter().map(Candidate::from).collect())
    }
}

/// Nearest-neighbor query joined to parent document metadata.
fn select_sql(chunks_table: &str, documents_table: &str, metric: DistanceMetric) -> String {
    let op = metric.pg_operator();
    format!(
        "SELECT \
            c.id::text AS id, \
            c.document_id::text AS document_id, \
            c.content AS content, \
            c.heading AS heading, \
            c.chunk_index::int4 AS chunk_index, \
            d.title AS title, \
            d.slug AS slug, \
            d.source AS source, \
            (c.embedding {op} $1)::float8 AS distance \
        FROM {chunks} c \
        JOIN {documents} d ON d.id = c.document_id \
        ORDER BY c.embedding {op} $1 ASC \
        LIMIT $2",
        op = op,
        chunks = qualified_name(chunks_table),
        documents = qualified_name(documents_table),
    )
}

/// Quote a possibly schema-qualified table name.
fn qualified_name(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Quotes Postgres identifiers, escaping embedded quotes.
fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}
