//! SQLite session store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{Message, ResponseMetadata, Role, SessionStore};
use crate::types::{Citation, TrustLevel};
use docent_core::{AppError, AppResult};

fn persistence_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Persistence(format!("{}: {}", context, e))
}

/// Sessions, messages and citations in one SQLite file.
///
/// Each call opens a connection inside a blocking task.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    path: PathBuf,
}

impl SqliteSessionStore {
    /// Open the store at `path`, creating the file and tables if missing.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let store = Self { path: path.into() };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> AppResult<Connection> {
        let conn = Connection::open(&self.path)
            .map_err(|e| persistence_error("Failed to open session store", e))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| persistence_error("Failed to configure session store", e))?;
        Ok(conn)
    }

    fn init(&self) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| persistence_error("Failed to create session directory", e))?;
        }

        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                metadata TEXT,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            );

            CREATE TABLE IF NOT EXISTS citations (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                url TEXT NOT NULL,
                article_title TEXT NOT NULL,
                excerpt TEXT NOT NULL,
                trust_level TEXT NOT NULL,
                relevance_score REAL NOT NULL,
                FOREIGN KEY (message_id) REFERENCES messages(id)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);
            CREATE INDEX IF NOT EXISTS idx_citations_message ON citations(message_id);
            "#,
        )
        .map_err(|e| persistence_error("Failed to create session tables", e))?;

        tracing::debug!("Initialized session store at {:?}", self.path);
        Ok(())
    }

    fn append_blocking(&self, session_id: &str, user: &Message, assistant: &Message) -> AppResult<()> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .map_err(|e| persistence_error("Failed to begin transaction", e))?;

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO sessions (id, created_at, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
            params![session_id, now],
        )
        .map_err(|e| persistence_error("Failed to upsert session", e))?;

        for message in [user, assistant] {
            let metadata = message
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            tx.execute(
                "INSERT INTO messages (id, session_id, role, content, timestamp, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id,
                    session_id,
                    message.role.as_str(),
                    message.content,
                    message.timestamp.to_rfc3339(),
                    metadata,
                ],
            )
            .map_err(|e| persistence_error("Failed to insert message", e))?;

            for (position, citation) in message.citations.iter().enumerate() {
                tx.execute(
                    "INSERT INTO citations
                        (id, message_id, position, url, article_title, excerpt, trust_level, relevance_score)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        citation.id,
                        message.id,
                        position as i64,
                        citation.url,
                        citation.article_title,
                        citation.excerpt,
                        citation.trust_level.as_str(),
                        citation.relevance_score,
                    ],
                )
                .map_err(|e| persistence_error("Failed to insert citation", e))?;
            }
        }

        tx.commit()
            .map_err(|e| persistence_error("Failed to commit exchange", e))?;
        Ok(())
    }

    fn messages_blocking(&self, session_id: &str) -> AppResult<Vec<Message>> {
        let conn = self.connect()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, role, content, timestamp, metadata FROM messages
                 WHERE session_id = ?1 ORDER BY rowid",
            )
            .map_err(|e| persistence_error("Failed to prepare message query", e))?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })
            .map_err(|e| persistence_error("Failed to query messages", e))?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, role, content, timestamp, metadata) =
                row.map_err(|e| persistence_error("Failed to read message row", e))?;

            let role = Role::parse(&role)
                .ok_or_else(|| AppError::Persistence(format!("Unknown message role: {}", role)))?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| persistence_error("Invalid message timestamp", e))?
                .with_timezone(&Utc);
            let metadata = metadata
                .map(|m| serde_json::from_str::<ResponseMetadata>(&m))
                .transpose()?;
            let citations = load_citations(&conn, &id)?;

            messages.push(Message {
                id,
                role,
                content,
                timestamp,
                citations,
                metadata,
            });
        }

        Ok(messages)
    }
}

fn load_citations(conn: &Connection, message_id: &str) -> AppResult<Vec<Citation>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, url, article_title, excerpt, trust_level, relevance_score FROM citations
             WHERE message_id = ?1 ORDER BY position",
        )
        .map_err(|e| persistence_error("Failed to prepare citation query", e))?;

    let rows = stmt
        .query_map(params![message_id], |row| {
            Ok((
                Citation {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    article_title: row.get(2)?,
                    excerpt: row.get(3)?,
                    trust_level: TrustLevel::Direct,
                    relevance_score: row.get(5)?,
                },
                row.get::<_, String>(4)?,
            ))
        })
        .map_err(|e| persistence_error("Failed to query citations", e))?;

    let mut citations = Vec::new();
    for row in rows {
        let (mut citation, trust_level) =
            row.map_err(|e| persistence_error("Failed to read citation row", e))?;
        citation.trust_level = TrustLevel::parse(&trust_level).ok_or_else(|| {
            AppError::Persistence(format!("Unknown citation trust level: {}", trust_level))
        })?;
        citations.push(citation);
    }

    Ok(citations)
}

#[async_trait::async_trait]
impl SessionStore for SqliteSessionStore {
    async fn append_exchange(
        &self,
        session_id: &str,
        user: &Message,
        assistant: &Message,
    ) -> AppResult<()> {
        let store = self.clone();
        let session_id = session_id.to_string();
        let user = user.clone();
        let assistant = assistant.clone();

        tokio::task::spawn_blocking(move || store.append_blocking(&session_id, &user, &assistant))
            .await
            .map_err(|e| persistence_error("Session write task failed", e))?
    }

    async fn messages(&self, session_id: &str) -> AppResult<Vec<Message>> {
        let store = self.clone();
        let session_id = session_id.to_string();

        tokio::task::spawn_blocking(move || store.messages_blocking(&session_id))
            .await
            .map_err(|e| persistence_error("Session read task failed", e))?
    }
}
