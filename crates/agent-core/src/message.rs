//! Conversation Messages
//!
//! Standard turn format used across the agent system, and the append-only
//! [`Conversation`] log handed to the orchestration loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{AgentError, Result};
use crate::tool::ToolCall;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single turn in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content; assistant turns that only request tools may have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls requested by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Request this tool turn answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Whether this tool turn carries an error description
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message requesting tools
    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls,
            ..Self::new(Role::Assistant, String::new())
        }
    }

    /// Create a tool result message
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            is_error,
            ..Self::new(Role::Tool, content)
        }
    }

    /// Text content, empty when absent
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Whether this is an assistant turn requesting at least one tool
    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// Ordered, append-only conversation log
///
/// The system prompt is never stored here; it is supplied separately on every
/// model request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation with prior history
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Take the messages back out
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Check the log can be sent to the model.
    ///
    /// Rejects system turns, tool turns that do not answer a request of the
    /// nearest preceding assistant turn, duplicate answers, and requests left
    /// unanswered when another turn follows them.
    pub fn validate(&self) -> Result<()> {
        let mut open: Option<(usize, HashSet<&str>)> = None;

        for (index, message) in self.messages.iter().enumerate() {
            match message.role {
                Role::System => {
                    return Err(AgentError::ProtocolViolation(format!(
                        "system turn at position {index}; the system prompt is supplied separately"
                    )));
                }
                Role::Tool => {
                    let id = message.tool_call_id.as_deref().ok_or_else(|| {
                        AgentError::ProtocolViolation(format!(
                            "tool turn at position {index} has no tool_call_id"
                        ))
                    })?;
                    let answered = open
                        .as_mut()
                        .is_some_and(|(_, pending)| pending.remove(id));
                    if !answered {
                        return Err(AgentError::ProtocolViolation(format!(
                            "tool turn at position {index} answers '{id}', which the preceding assistant turn did not request or was already answered"
                        )));
                    }
                }
                Role::User | Role::Assistant => {
                    if let Some((at, pending)) = open.take() {
                        if !pending.is_empty() {
                            return Err(AgentError::ProtocolViolation(format!(
                                "assistant turn at position {at} has unanswered tool calls: {}",
                                sorted(&pending).join(", ")
                            )));
                        }
                    }
                    if message.role == Role::Assistant {
                        open = Some((index, request_ids(index, message)?));
                    }
                }
            }
        }

        // A trailing batch may still be waiting on its results; the loop never
        // hands such a log to the model, so only completed batches matter here.
        Ok(())
    }

    /// Requests of the last assistant turn that have no tool turn yet
    pub fn pending_tool_calls(&self) -> Vec<&ToolCall> {
        let Some(position) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
        else {
            return Vec::new();
        };

        let answered: HashSet<&str> = self.messages[position + 1..]
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();

        self.messages[position]
            .tool_calls
            .iter()
            .filter(|call| !answered.contains(call.id.as_str()))
            .collect()
    }
}

/// Collect the request ids of an assistant turn, rejecting empty or repeated ids
pub(crate) fn request_ids(index: usize, message: &Message) -> Result<HashSet<&str>> {
    let mut ids = HashSet::new();
    for call in &message.tool_calls {
        if call.id.is_empty() {
            return Err(AgentError::ProtocolViolation(format!(
                "assistant turn at position {index} requested '{}' without a call id",
                call.name
            )));
        }
        if !ids.insert(call.id.as_str()) {
            return Err(AgentError::ProtocolViolation(format!(
                "assistant turn at position {index} repeats call id '{}'",
                call.id
            )));
        }
    }
    Ok(ids)
}

fn sorted<'a>(ids: &HashSet<&'a str>) -> Vec<&'a str> {
    let mut ids: Vec<_> = ids.iter().copied().collect();
    ids.sort_unstable();
    ids
}
