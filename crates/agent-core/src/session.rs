//! Session Management
//!
//! Chat history kept by the caller between orchestration runs. Each run gets a
//! copy of the session's conversation and the session adopts the updated log
//! once the run finishes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message, Role};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Conversation history
    pub conversation: Conversation,

    /// Session title (user-set)
    pub title: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            conversation: Conversation::new(),
            title: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create with specific ID
    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            ..Self::new()
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Replace the history with the log returned by a finished run
    pub fn adopt(&mut self, conversation: Conversation) {
        self.conversation = conversation;
        self.touch();
    }

    /// Record a failed run: the question and the explanation shown instead
    pub fn record_failure(&mut self, question: Message, explanation: Message) {
        self.conversation.push(question);
        self.conversation.push(explanation);
        self.touch();
    }

    /// Get or generate title
    pub fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| {
            self.conversation
                .messages()
                .iter()
                .find(|m| m.role == Role::User)
                .map(|m| {
                    let text = m.text();
                    let preview: String = text.chars().take(50).collect();
                    if text.chars().count() > 50 {
                        format!("{preview}...")
                    } else {
                        preview
                    }
                })
                .unwrap_or_else(|| format!("Session {}", self.id.0.chars().take(8).collect::<String>()))
        })
    }

    /// Turns worth showing to a person: user questions and assistant answers
    pub fn transcript(&self) -> Vec<&Message> {
        self.conversation
            .messages()
            .iter()
            .filter(|m| match m.role {
                Role::User => true,
                Role::Assistant => m.content.as_deref().is_some_and(|c| !c.is_empty()),
                Role::System | Role::Tool => false,
            })
            .collect()
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.conversation.len()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Session store trait for persistence
pub trait SessionStore: Send + Sync {
    /// Save a session
    fn save(&self, session: &Session) -> Result<()>;

    /// Load a session by ID
    fn load(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Delete a session
    fn delete(&self, id: &SessionId) -> Result<()>;

    /// Most recently updated sessions
    fn list(&self, limit: usize) -> Result<Vec<Session>>;
}

/// In-memory session store (for development/testing)
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> AgentError {
    AgentError::Session("session store lock poisoned".into())
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(id).cloned())
    }

    fn delete(&self, id: &SessionId) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.remove(id);
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        let mut result: Vec<_> = sessions.values().cloned().collect();

        // Sort by updated_at descending
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        result.truncate(limit);

        Ok(result)
    }
}
