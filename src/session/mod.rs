//! Conversation sessions and memory
//!
//! Owns session identity, durable message history, and the bounded
//! in-process recency window fed to the model. The window is a cost bound,
//! not the durability boundary: full history stays queryable from the
//! metadata store. Eviction is strict FIFO by turn; any token-budget
//! trimming is the orchestrator's business at prompt-assembly time.

use crate::config::ChatConfig;
use crate::error::Result;
use crate::meta::{Message, MetaDb, Role, Session};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// One remembered conversation turn
#[derive(Debug, Clone)]
pub struct WindowTurn {
    pub role: Role,
    pub content: String,
}

/// Session manager over the metadata store plus per-session recency windows
pub struct SessionManager {
    db: MetaDb,
    windows: Mutex<HashMap<String, VecDeque<WindowTurn>>>,
    max_turns: usize,
}

impl SessionManager {
    pub fn new(db: MetaDb, config: &ChatConfig) -> Self {
        Self {
            db,
            windows: Mutex::new(HashMap::new()),
            max_turns: config.memory_window,
        }
    }

    /// Resolve an existing active session or create a new one.
    ///
    /// A missing or unknown/inactive external id yields a fresh session; a
    /// missing id also gets a generated identifier.
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
        user_id: &str,
    ) -> Result<Session> {
        let external_id = match session_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        if let Some(session) = self.db.find_active_session(&external_id).await? {
            return Ok(session);
        }

        let user = if user_id.is_empty() { "anonymous" } else { user_id };
        let session = Session::new(external_id.clone(), user.to_string());
        self.db.insert_session(&session).await?;
        info!("Created session {} for user {}", external_id, user);
        Ok(session)
    }

    /// Append a message to durable history and to the recency window
    pub async fn append(&self, session: &Session, message: Message) -> Result<()> {
        let role = message.get_role()?;
        let content = message.content.clone();

        self.db.insert_message(&message).await?;
        self.db.touch_session(&session.id).await?;

        let mut windows = self.windows.lock().await;
        let window = windows
            .entry(session.session_id.clone())
            .or_insert_with(VecDeque::new);
        window.push_back(WindowTurn { role, content });
        while window.len() > self.max_turns {
            window.pop_front();
        }

        Ok(())
    }

    /// The recency window for an external session id, oldest first
    pub async fn window(&self, session_id: &str) -> Vec<WindowTurn> {
        let windows = self.windows.lock().await;
        windows
            .get(session_id)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Full durable history for an external session id. An unknown id is an
    /// empty history, not a fault.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>> {
        self.db.list_messages(session_id).await
    }

    /// Deactivate a session and evict its recency window. History rows are
    /// retained. Returns false when no active session carried the id.
    pub async fn clear(&self, session_id: &str) -> Result<bool> {
        let deactivated = self.db.deactivate_sessions(session_id).await?;

        let mut windows = self.windows.lock().await;
        windows.remove(session_id);

        debug!(
            "Cleared session {} ({} rows deactivated)",
            session_id, deactivated
        );
        Ok(deactivated > 0)
    }
}
