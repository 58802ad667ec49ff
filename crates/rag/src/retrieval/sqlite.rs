//! SQLite-backed corpus with brute-force nearest-neighbor search.
//!
//! Embeddings are stored as little-endian `f32` blobs. Every request opens
//! its own connection inside a blocking task and closes it when the task
//! ends.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use super::{CandidateRetriever, DistanceMetric};
use crate::types::{Candidate, Chunk, Document};
use docent_core::{AppError, AppResult, CancelSignal};

/// A local chunk corpus stored in one SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteCorpus {
    path: PathBuf,
    metric: DistanceMetric,
}

impl SqliteCorpus {
    pub fn new(path: impl Into<PathBuf>, metric: DistanceMetric) -> Self {
        Self {
            path: path.into(),
            metric,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> AppResult<Connection> {
        Connection::open(&self.path)
            .map_err(|e| AppError::Datastore(format!("Failed to open SQLite corpus: {}", e)))
    }

    /// Create the corpus file and its tables if missing.
    pub fn init(&self) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Datastore(format!("Failed to create corpus directory: {}", e))
            })?;
        }

        let conn = self.open()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL,
                source TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                content TEXT NOT NULL,
                heading TEXT,
                chunk_index INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id)
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
            "#,
        )
        .map_err(|e| AppError::Datastore(format!("Failed to create tables: {}", e)))?;

        tracing::debug!("Initialized SQLite corpus at {:?}", self.path);
        Ok(())
    }

    /// Insert or replace a document.
    pub fn insert_document(&self, document: &Document) -> AppResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR REPLACE INTO documents (id, title, slug, source) VALUES (?1, ?2, ?3, ?4)",
            params![document.id, document.title, document.slug, document.source],
        )
        .map_err(|e| AppError::Datastore(format!("Failed to insert document: {}", e)))?;
        Ok(())
    }

    /// Insert or replace a chunk with its embedding.
    ///
    /// Only the chunk-level fields are stored; title, slug and source come
    /// from the parent document at query time.
    pub fn insert_chunk(&self, chunk: &Chunk, embedding: &[f32]) -> AppResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR REPLACE INTO chunks (id, document_id, content, heading, chunk_index, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chunk.id,
                chunk.document_id,
                chunk.content,
                chunk.heading,
                chunk.chunk_index,
                embedding_to_bytes(embedding),
            ],
        )
        .map_err(|e| AppError::Datastore(format!("Failed to insert chunk: {}", e)))?;
        Ok(())
    }

    /// Return up to `limit` chunks closest to `query`, ascending by distance.
    pub fn nearest(&self, query: &[f32], limit: usize) -> AppResult<Vec<Candidate>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.document_id, c.content, c.heading, c.chunk_index, c.embedding,
                        d.title, d.slug, d.source
                 FROM chunks c
                 JOIN documents d ON d.id = c.document_id
                 ORDER BY c.rowid",
            )
            .map_err(|e| AppError::Datastore(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let embedding: Vec<u8> = row.get(5)?;
                Ok((
                    Chunk {
                        id: row.get(0)?,
                        document_id: row.get(1)?,
                        content: row.get(2)?,
                        heading: row.get(3)?,
                        chunk_index: row.get(4)?,
                        title: row.get(6)?,
                        slug: row.get(7)?,
                        source: row.get(8)?,
                    },
                    embedding,
                ))
            })
            .map_err(|e| AppError::Datastore(format!("Failed to query chunks: {}", e)))?;

        let mut candidates = Vec::new();
        for row in rows {
            let (chunk, bytes) =
                row.map_err(|e| AppError::Datastore(format!("Failed to read chunk row: {}", e)))?;
            let embedding = bytes_to_embedding(&bytes)?;
            if embedding.len() != query.len() {
                return Err(AppError::Datastore(format!(
                    "Chunk {} has a {}-dimensional embedding, expected {}",
                    chunk.id,
                    embedding.len(),
                    query.len()
                )));
            }
            let distance = self.metric.distance(query, &embedding);
            candidates.push(Candidate { chunk, distance });
        }

        // Stable: equal distances keep insertion order
        candidates.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        candidates.truncate(limit);

        tracing::debug!(
            "Retrieved {} chunks (requested top-{})",
            candidates.len(),
            limit
        );

        Ok(candidates)
    }
}

#[async_trait::async_trait]
impl CandidateRetriever for SqliteCorpus {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn retrieve(
        &self,
        query: &[f32],
        limit: usize,
        cancel: &CancelSignal,
    ) -> AppResult<Vec<Candidate>> {
        let corpus = self.clone();
        let query = query.to_vec();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled("retrieve cancelled".to_string()));
            }
            corpus.nearest(&query, limit)
        })
        .await
        .map_err(|e| AppError::Datastore(format!("Retrieval task failed: {}", e)))?
    }
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Datastore(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
