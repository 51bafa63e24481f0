//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Model backend could not produce a valid assistant turn
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Tool-call correlation between assistant and tool turns is broken
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The model kept requesting tools past the configured limit
    #[error("Maximum depth ({0}) exceeded")]
    DepthExceeded(usize),

    /// Tool not found in registry
    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Session error
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::ModelUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            AgentError::ProtocolViolation(_) => {
                "The AI service returned an inconsistent response. Please start a new conversation."
                    .into()
            }
            AgentError::DepthExceeded(_) => {
                "The request took too many steps to process. Please try a simpler query.".into()
            }
            AgentError::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            AgentError::ToolValidation(msg) => format!("Invalid tool input: {msg}"),
            AgentError::ToolExecution(msg) => format!("Tool error: {msg}"),
            AgentError::Session(_) => "Your conversation could not be found or saved.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
