use std::collections::HashMap;
use std::sync::Mutex;

use super::{Message, SessionStore};
use docent_core::{AppError, AppResult};

/// Session store kept in process memory, lost on exit.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Vec<Message>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append_exchange(
        &self,
        session_id: &str,
        user: &Message,
        assistant: &Message,
    ) -> AppResult<()> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| AppError::Persistence("Session store lock poisoned".to_string()))?;
        let log = sessions.entry(session_id.to_string()).or_default();
        log.push(user.clone());
        log.push(assistant.clone());
        Ok(())
    }

    async fn messages(&self, session_id: &str) -> AppResult<Vec<Message>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| AppError::Persistence("Session store lock poisoned".to_string()))?;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }
}
